//! ACL Evaluator (C6, spec §4.6): Consul-like deny-by-default,
//! allow-combine evaluation over (policy-set, resource, capability).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use konsul_core::error::{Error, Result};
use konsul_core::model::{Capability, Policy, Resource};
use konsul_core::pattern::Pattern;
use parking_lot::RwLock;

pub struct AclEvaluator {
    enabled: bool,
    policies: RwLock<HashMap<String, Policy>>,
    unknown_policy_misses: AtomicU64,
    eval_errors: AtomicU64,
}

impl AclEvaluator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            policies: RwLock::new(HashMap::new()),
            unknown_policy_misses: AtomicU64::new(0),
            eval_errors: AtomicU64::new(0),
        }
    }

    pub fn validate(&self, policy: &Policy) -> Result<()> {
        if policy.name.is_empty() {
            return Err(Error::InvalidArgument("policy name must not be empty".into()));
        }
        if policy.rules.is_empty() {
            return Err(Error::InvalidArgument("policy must have at least one rule".into()));
        }
        for rule in &policy.rules {
            if rule.capabilities.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "policy {} has a rule with no capabilities",
                    policy.name
                )));
            }
        }
        Ok(())
    }

    pub fn add_policy(&self, policy: Policy) -> Result<()> {
        self.validate(&policy)?;
        let mut policies = self.policies.write();
        if policies.contains_key(&policy.name) {
            return Err(Error::AlreadyExists(policy.name));
        }
        policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    pub fn update_policy(&self, policy: Policy) -> Result<()> {
        self.validate(&policy)?;
        let mut policies = self.policies.write();
        if !policies.contains_key(&policy.name) {
            return Err(Error::NotFound(policy.name));
        }
        policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    pub fn delete_policy(&self, name: &str) -> Result<()> {
        let mut policies = self.policies.write();
        if policies.remove(name).is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn get_policy(&self, name: &str) -> Option<Policy> {
        self.policies.read().get(name).cloned()
    }

    pub fn list_policies(&self) -> Vec<Policy> {
        self.policies.read().values().cloned().collect()
    }

    /// `evaluate(policy_names[], resource, capability) -> bool`. When ACLs
    /// are disabled every request is allowed.
    pub fn evaluate(&self, policy_names: &[String], resource: &Resource<'_>, capability: Capability) -> bool {
        if !self.enabled {
            return true;
        }
        let policies = self.policies.read();
        let mut allowed = false;
        for name in policy_names {
            let Some(policy) = policies.get(name) else {
                self.unknown_policy_misses.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            for rule in &policy.rules {
                if !self.rule_applies(rule, resource) {
                    continue;
                }
                if rule.capabilities.contains(&capability) || rule.capabilities.contains(&Capability::Sudo) {
                    allowed = true;
                }
            }
        }
        allowed
    }

    /// Whether `rule` applies to `resource`. Never panics on a rule this
    /// evaluator previously accepted through `add_policy`/`update_policy`;
    /// any unexpected shape is treated as a non-match and counted.
    fn rule_applies(&self, rule: &konsul_core::model::Rule, resource: &Resource<'_>) -> bool {
        if rule.class != resource.class {
            return false;
        }
        match (&rule.pattern, resource.selector) {
            (None, _) => true,
            (Some(pattern), Some(selector)) => Pattern::compile(pattern).matches(selector),
            (Some(_), None) => {
                self.eval_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn unknown_policy_misses(&self) -> u64 {
        self.unknown_policy_misses.load(Ordering::Relaxed)
    }

    pub fn eval_error_count(&self) -> u64 {
        self.eval_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konsul_core::model::{Capability, ResourceClass, Rule};

    fn kv_policy(name: &str, pattern: &str, caps: &[Capability]) -> Policy {
        Policy {
            name: name.to_string(),
            rules: vec![Rule { class: ResourceClass::Kv, pattern: Some(pattern.to_string()), capabilities: caps.to_vec() }],
        }
    }

    #[test]
    fn denies_by_default_with_no_matching_policy() {
        let acl = AclEvaluator::new(true);
        acl.add_policy(kv_policy("readonly", "app/*", &[Capability::Read])).unwrap();
        let resource = Resource::kv("other/key");
        assert!(!acl.evaluate(&["readonly".to_string()], &resource, Capability::Read));
    }

    #[test]
    fn allows_when_matching_policy_grants_capability() {
        let acl = AclEvaluator::new(true);
        acl.add_policy(kv_policy("readonly", "app/*", &[Capability::Read])).unwrap();
        let resource = Resource::kv("app/config");
        assert!(acl.evaluate(&["readonly".to_string()], &resource, Capability::Read));
        assert!(!acl.evaluate(&["readonly".to_string()], &resource, Capability::Write));
    }

    #[test]
    fn sudo_capability_grants_everything_matched() {
        let acl = AclEvaluator::new(true);
        acl.add_policy(kv_policy("root", "**", &[Capability::Sudo])).unwrap();
        let resource = Resource::kv("anything/here");
        assert!(acl.evaluate(&["root".to_string()], &resource, Capability::Delete));
    }

    #[test]
    fn disabled_acl_allows_everything() {
        let acl = AclEvaluator::new(false);
        let resource = Resource::kv("anything");
        assert!(acl.evaluate(&[], &resource, Capability::Write));
    }

    #[test]
    fn unknown_policy_name_is_ignored_and_counted() {
        let acl = AclEvaluator::new(true);
        let resource = Resource::kv("x");
        assert!(!acl.evaluate(&["ghost".to_string()], &resource, Capability::Read));
        assert_eq!(acl.unknown_policy_misses(), 1);
    }

    #[test]
    fn duplicate_add_returns_already_exists() {
        let acl = AclEvaluator::new(true);
        acl.add_policy(kv_policy("p", "*", &[Capability::Read])).unwrap();
        assert!(matches!(acl.add_policy(kv_policy("p", "*", &[Capability::Read])), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn update_missing_policy_returns_not_found() {
        let acl = AclEvaluator::new(true);
        assert!(matches!(acl.update_policy(kv_policy("p", "*", &[Capability::Read])), Err(Error::NotFound(_))));
    }

    #[test]
    fn combining_policies_is_monotonic() {
        let acl = AclEvaluator::new(true);
        acl.add_policy(kv_policy("a", "x/*", &[Capability::Read])).unwrap();
        let resource = Resource::kv("x/1");
        let before = acl.evaluate(&["a".to_string()], &resource, Capability::Write);
        acl.add_policy(kv_policy("b", "x/*", &[Capability::Write])).unwrap();
        let after = acl.evaluate(&["a".to_string(), "b".to_string()], &resource, Capability::Write);
        assert!(!before);
        assert!(after);
    }

    #[test]
    fn class_scoped_rule_ignores_pattern() {
        let acl = AclEvaluator::new(true);
        let policy = Policy {
            name: "admin".to_string(),
            rules: vec![Rule { class: ResourceClass::Admin, pattern: None, capabilities: vec![Capability::Read] }],
        };
        acl.add_policy(policy).unwrap();
        let resource = Resource::class_scoped(ResourceClass::Admin);
        assert!(acl.evaluate(&["admin".to_string()], &resource, Capability::Read));
    }
}
