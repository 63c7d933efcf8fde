//! A single policy scoped to `kv` under `app/*` allows read there, denies
//! write there, and denies read outside its pattern.

use konsul_acl::AclEvaluator;
use konsul_core::model::{Capability, Policy, Resource, ResourceClass, Rule};

fn p1() -> Policy {
    Policy {
        name: "p1".into(),
        rules: vec![Rule { class: ResourceClass::Kv, pattern: Some("app/*".into()), capabilities: vec![Capability::Read] }],
    }
}

#[test]
fn allow_matching_read_deny_write_and_deny_out_of_pattern() {
    let acl = AclEvaluator::new(true);
    acl.add_policy(p1()).unwrap();
    let names = vec!["p1".to_string()];

    assert!(acl.evaluate(&names, &Resource::kv("app/x"), Capability::Read));
    assert!(!acl.evaluate(&names, &Resource::kv("app/x"), Capability::Write));
    assert!(!acl.evaluate(&names, &Resource::kv("other"), Capability::Read));
}

#[test]
fn disabled_acl_allows_everything_regardless_of_policy() {
    let acl = AclEvaluator::new(false);
    let names: Vec<String> = vec![];
    assert!(acl.evaluate(&names, &Resource::kv("anything"), Capability::Write));
}

#[test]
fn unknown_policy_name_contributes_no_grants() {
    let acl = AclEvaluator::new(true);
    acl.add_policy(p1()).unwrap();
    let names = vec!["does-not-exist".to_string()];
    assert!(!acl.evaluate(&names, &Resource::kv("app/x"), Capability::Read));
}
