//! Policy model definition.
//!
//! The engine evaluates one fixed grammar (subject, domain, object, action,
//! data scope; OR-combined allow rules; two grouping relations). The model
//! definition file exists so deployments can pin the grammar explicitly and
//! so a drifted or hand-edited definition is caught at startup instead of
//! silently changing decisions. An unparseable or unsupported definition is
//! a fatal configuration error.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

/// Embedded default model definition, matching the engine's fixed grammar.
pub const DEFAULT_MODEL: &str = r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act, data_scope

[role_definition]
g = _, _, _
g2 = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (g(r.sub, p.sub, r.dom) || g(r.sub, p.sub, "*")) && (r.dom == p.dom || p.dom == "*") && keyMatch2(r.obj, p.obj) && (r.act == p.act || p.act == "*")
"#;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing section [{0}]")]
    MissingSection(&'static str),

    #[error("malformed line in [{section}]: '{line}'")]
    MalformedLine { section: String, line: String },

    #[error("unsupported {what}: expected '{expected}', got '{got}'")]
    Unsupported {
        what: &'static str,
        expected: String,
        got: String,
    },

    #[error("failed to read model definition: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed and validated policy model definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyModel {
    /// Request tokens (always `sub, dom, obj, act`).
    pub request: Vec<String>,
    /// Policy tokens (request tokens plus `data_scope`).
    pub policy: Vec<String>,
    /// Grouping relation arities keyed by name (`g` is domain-scoped
    /// membership, `g2` is inheritance).
    pub groupings: BTreeMap<String, usize>,
    pub effect: String,
    pub matcher: String,
}

impl PolicyModel {
    /// Parse and validate a model definition.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let sections = split_sections(text)?;

        let request = parse_tokens(&sections, "request_definition", "r")?;
        let policy = parse_tokens(&sections, "policy_definition", "p")?;
        let effect = single_value(&sections, "policy_effect", "e")?;
        let matcher = single_value(&sections, "matchers", "m")?;

        let mut groupings = BTreeMap::new();
        for (key, value) in section_entries(&sections, "role_definition")? {
            let arity = value.split(',').count();
            groupings.insert(key, arity);
        }

        let model = Self {
            request,
            policy,
            groupings,
            effect,
            matcher,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load a model definition from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The embedded default grammar.
    pub fn default_model() -> Self {
        // The embedded text is validated by tests; a parse failure here
        // would be a build defect, so surface it loudly.
        match Self::parse(DEFAULT_MODEL) {
            Ok(model) => model,
            Err(e) => unreachable!("embedded default model is invalid: {e}"),
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        let expected_request = ["sub", "dom", "obj", "act"];
        if self.request != expected_request {
            return Err(ModelError::Unsupported {
                what: "request definition",
                expected: expected_request.join(", "),
                got: self.request.join(", "),
            });
        }

        let expected_policy = ["sub", "dom", "obj", "act", "data_scope"];
        if self.policy != expected_policy {
            return Err(ModelError::Unsupported {
                what: "policy definition",
                expected: expected_policy.join(", "),
                got: self.policy.join(", "),
            });
        }

        if self.groupings.get("g") != Some(&3) || self.groupings.get("g2") != Some(&2) {
            let got = self
                .groupings
                .iter()
                .map(|(k, v)| format!("{k}/{v}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ModelError::Unsupported {
                what: "role definitions",
                expected: "g/3, g2/2".to_string(),
                got,
            });
        }

        if !self.effect.contains("some(where (p.eft == allow))") {
            return Err(ModelError::Unsupported {
                what: "policy effect",
                expected: "some(where (p.eft == allow))".to_string(),
                got: self.effect.clone(),
            });
        }

        Ok(())
    }
}

impl Default for PolicyModel {
    fn default() -> Self {
        Self::default_model()
    }
}

type Sections = BTreeMap<String, Vec<(String, String)>>;

fn split_sections(text: &str) -> Result<Sections, ModelError> {
    let mut sections: Sections = BTreeMap::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.trim().to_string());
            sections.entry(name.trim().to_string()).or_default();
            continue;
        }
        let Some(section) = current.as_deref() else {
            return Err(ModelError::MalformedLine {
                section: "<none>".to_string(),
                line: line.to_string(),
            });
        };
        let Some((key, value)) = line.split_once('=') else {
            return Err(ModelError::MalformedLine {
                section: section.to_string(),
                line: line.to_string(),
            });
        };
        sections
            .entry(section.to_string())
            .or_default()
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(sections)
}

fn section_entries(
    sections: &Sections,
    name: &'static str,
) -> Result<Vec<(String, String)>, ModelError> {
    sections
        .get(name)
        .cloned()
        .ok_or(ModelError::MissingSection(name))
}

fn parse_tokens(sections: &Sections, name: &'static str, key: &str) -> Result<Vec<String>, ModelError> {
    let value = lookup(sections, name, key)?;
    Ok(value.split(',').map(|t| t.trim().to_string()).collect())
}

fn single_value(sections: &Sections, name: &'static str, key: &str) -> Result<String, ModelError> {
    lookup(sections, name, key)
}

fn lookup(sections: &Sections, name: &'static str, key: &str) -> Result<String, ModelError> {
    let entries = section_entries(sections, name)?;
    entries
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or(ModelError::MissingSection(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_parses() {
        let model = PolicyModel::default_model();
        assert_eq!(model.request, ["sub", "dom", "obj", "act"]);
        assert_eq!(model.policy.last().map(String::as_str), Some("data_scope"));
        assert_eq!(model.groupings.get("g"), Some(&3));
        assert_eq!(model.groupings.get("g2"), Some(&2));
    }

    #[test]
    fn missing_section_is_fatal() {
        let err = PolicyModel::parse("[request_definition]\nr = sub, dom, obj, act\n").unwrap_err();
        assert!(matches!(err, ModelError::MissingSection(_)));
    }

    #[test]
    fn foreign_grammar_is_rejected() {
        let text = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;
        let err = PolicyModel::parse(text).unwrap_err();
        assert!(matches!(err, ModelError::Unsupported { .. }));
    }

    #[test]
    fn malformed_line_is_reported() {
        let err = PolicyModel::parse("[request_definition]\nnot a key value\n").unwrap_err();
        assert!(matches!(err, ModelError::MalformedLine { .. }));
    }
}
