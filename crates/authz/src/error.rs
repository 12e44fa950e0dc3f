use thiserror::Error;

/// Errors raised by the decision engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// A wire-form string did not parse (`role:<code>`, `dept:<id>`, action
    /// or scope name).
    #[error("malformed {kind} string: '{value}'")]
    MalformedWire { kind: &'static str, value: String },

    /// Adding the edge would create a cycle in the role inheritance graph.
    #[error("role inheritance cycle: '{child}' -> '{parent}'")]
    InheritanceCycle { child: String, parent: String },
}

impl AuthzError {
    pub(crate) fn malformed(kind: &'static str, value: impl Into<String>) -> Self {
        Self::MalformedWire {
            kind,
            value: value.into(),
        }
    }
}
