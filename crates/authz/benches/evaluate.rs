use criterion::{criterion_group, criterion_main, Criterion};

use sentra_authz::{Action, DataScope, Domain, GrantRule, RuleStore, Subject};
use sentra_core::DepartmentId;

fn build_store(grants: usize) -> (RuleStore, DepartmentId) {
    let store = RuleStore::new();
    let dept = DepartmentId::new();
    for i in 0..grants {
        store.add_grant(GrantRule::new(
            Subject::role(format!("role_{i}")),
            if i % 4 == 0 {
                Domain::Wildcard
            } else {
                Domain::Department(dept)
            },
            format!("menu:item_{i}"),
            Action::Read,
            DataScope::Department,
        ));
    }
    (store, dept)
}

fn bench_evaluate(c: &mut Criterion) {
    let (store, dept) = build_store(1_000);
    let subject = Subject::role("role_500");
    let domain = Domain::Department(dept);

    c.bench_function("evaluate_hit_1k_grants", |b| {
        b.iter(|| store.evaluate(&subject, &domain, "menu:item_500", Action::Read))
    });

    let miss = Subject::role("no_such_role");
    c.bench_function("evaluate_miss_1k_grants", |b| {
        b.iter(|| store.evaluate(&miss, &domain, "menu:item_999", Action::Write))
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
