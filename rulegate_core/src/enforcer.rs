//! Composition of several policies.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::operators::OperatorRegistry;
use crate::policy::{Evaluation, Policy};
use crate::value::{to_value, Value};

/// Gates resources on a fixed set of policies.
///
/// The enforcer never changes after construction, so it can be shared
/// across threads and called concurrently without locking.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    registry: Arc<OperatorRegistry>,
    policies: Vec<Policy>,
}

impl PolicyEnforcer {
    /// An enforcer over `policies` using the shared operator registry.
    pub fn new(policies: Vec<Policy>) -> Self {
        Self::with_registry(OperatorRegistry::shared(), policies)
    }

    pub fn with_registry(registry: Arc<OperatorRegistry>, policies: Vec<Policy>) -> Self {
        Self { registry, policies }
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Whether every policy allows `resource`.
    ///
    /// An enforcer without policies denies everything.
    pub fn enforce<T: Serialize + ?Sized>(&self, resource: &T) -> bool {
        match to_value(resource) {
            Ok(value) => self.enforce_value(&value),
            Err(err) => {
                debug!("Could not convert resource for enforcement: {}", err);
                false
            }
        }
    }

    pub fn enforce_value(&self, resource: &Value) -> bool {
        if self.policies.is_empty() {
            debug!("No policies configured, denying");
            return false;
        }
        self.policies
            .iter()
            .all(|policy| policy.evaluate_with(&self.registry, resource))
    }

    /// The policies that individually allow `resource`, in configured order.
    pub fn match_policies<T: Serialize + ?Sized>(&self, resource: &T) -> Vec<&Policy> {
        match to_value(resource) {
            Ok(value) => self.match_value(&value),
            Err(err) => {
                debug!("Could not convert resource for matching: {}", err);
                Vec::new()
            }
        }
    }

    pub fn match_value(&self, resource: &Value) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|policy| policy.evaluate_with(&self.registry, resource))
            .collect()
    }

    /// One evaluation per policy, without short-circuiting.
    pub fn explain(&self, resource: &Value) -> Vec<Evaluation> {
        self.policies
            .iter()
            .map(|policy| policy.explain_with(&self.registry, resource))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Rule;
    use crate::value::Object;
    use std::thread;

    fn policies() -> Vec<Policy> {
        vec![
            Policy::new("finalized", vec![Rule::new("Status", "==", "final")]),
            Policy::new("has-id", vec![Rule::new("Id", ">", 0)]),
            Policy::new("tagged", vec![Rule::new("Tags", "==", vec!["b", "a"])]),
        ]
    }

    fn asset(status: &str, id: i64) -> Value {
        Value::from(
            Object::new()
                .with("Status", status)
                .with("Id", id)
                .with("Tags", vec!["a", "b"]),
        )
    }

    #[test]
    fn test_empty_enforcer_denies() {
        let enforcer = PolicyEnforcer::new(Vec::new());
        assert!(!enforcer.enforce_value(&asset("final", 1)));
        assert!(!enforcer.enforce_value(&Value::from(Object::new())));
        assert!(enforcer.match_value(&asset("final", 1)).is_empty());
    }

    #[test]
    fn test_enforce_requires_all() {
        let enforcer = PolicyEnforcer::new(policies());
        assert!(enforcer.enforce_value(&asset("final", 7)));
        assert!(!enforcer.enforce_value(&asset("draft", 7)));
        assert!(!enforcer.enforce_value(&asset("final", 0)));
    }

    #[test]
    fn test_match_keeps_order() {
        let enforcer = PolicyEnforcer::new(policies());
        let names: Vec<&str> = enforcer
            .match_value(&asset("draft", 7))
            .into_iter()
            .map(|policy| policy.name.as_str())
            .collect();
        assert_eq!(names, vec!["has-id", "tagged"]);
    }

    #[test]
    fn test_explain_covers_every_policy() {
        let enforcer = PolicyEnforcer::new(policies());
        let evaluations = enforcer.explain(&asset("draft", 0));
        assert_eq!(evaluations.len(), 3);
        assert!(!evaluations[0].allowed);
        assert!(!evaluations[1].allowed);
        assert!(evaluations[2].allowed);
    }

    #[test]
    fn test_concurrent_enforcement() {
        let enforcer = Arc::new(PolicyEnforcer::new(policies()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let enforcer = Arc::clone(&enforcer);
                thread::spawn(move || {
                    let status = if i % 2 == 0 { "final" } else { "draft" };
                    (i, enforcer.enforce_value(&asset(status, 1)))
                })
            })
            .collect();

        for handle in handles {
            let (i, allowed) = handle.join().unwrap();
            assert_eq!(allowed, i % 2 == 0);
        }
    }
}
