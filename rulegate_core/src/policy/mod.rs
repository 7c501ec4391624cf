//! Policies: named conjunctions of rules.
//!
//! A policy allows a resource when every one of its rules holds. Evaluation
//! is fail-closed: a rule that cannot be evaluated (missing field, private
//! field, unknown operator) counts as a failed rule and is only reported
//! through logging and [`Policy::explain`].

mod evaluation;
mod rule;

pub use evaluation::{Denial, DenialReason, Evaluation};
pub use rule::{Rule, RuleValue, ANY};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PolicyError, Result};
use crate::operators::OperatorRegistry;
use crate::value::{to_value, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "rules", default)]
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Parse a policy document.
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Policy = serde_json::from_str(json)?;
        info!("Parsed policy {} with {} rules", policy.name, policy.rules.len());
        Ok(policy)
    }

    /// Evaluate any serializable resource with the shared registry.
    ///
    /// A resource that cannot be converted is denied.
    pub fn evaluate<T: Serialize + ?Sized>(&self, resource: &T) -> bool {
        match to_value(resource) {
            Ok(value) => self.evaluate_value(&value),
            Err(err) => {
                debug!("Policy {} could not convert resource: {}", self.name, err);
                false
            }
        }
    }

    pub fn evaluate_value(&self, resource: &Value) -> bool {
        self.evaluate_with(&OperatorRegistry::shared(), resource)
    }

    pub fn evaluate_with(&self, registry: &OperatorRegistry, resource: &Value) -> bool {
        evaluation::first_failure(self, registry, resource).is_none()
    }

    /// Evaluate with the shared registry and report the first failing rule.
    pub fn explain(&self, resource: &Value) -> Evaluation {
        self.explain_with(&OperatorRegistry::shared(), resource)
    }

    pub fn explain_with(&self, registry: &OperatorRegistry, resource: &Value) -> Evaluation {
        evaluation::evaluate(self, registry, resource)
    }

    /// Static checks against `registry`.
    ///
    /// Findings are advisory. A policy with findings still evaluates, and the
    /// offending rules simply never hold.
    pub fn validate(&self, registry: &OperatorRegistry) -> Vec<PolicyError> {
        let mut findings = Vec::new();
        for rule in &self.rules {
            match &rule.value {
                RuleValue::Nested(nested) => {
                    if rule.operator != ANY {
                        findings.push(PolicyError::InvalidRule(format!(
                            "nested rules on {} need the '{}' operator, found '{}'",
                            rule.field, ANY, rule.operator
                        )));
                    }
                    for inner in nested {
                        if inner.is_nested() || inner.operator == ANY {
                            findings.push(PolicyError::InvalidRule(format!(
                                "'{}' rules cannot be nested under {}",
                                ANY, rule.field
                            )));
                        } else if !registry.contains(&inner.operator) {
                            findings.push(PolicyError::UnsupportedOperator(inner.operator.clone()));
                        }
                    }
                }
                _ if rule.operator == ANY => {
                    findings.push(PolicyError::InvalidRule(format!(
                        "'{}' on field {} needs a list of rules",
                        ANY, rule.field
                    )));
                }
                _ if !registry.contains(&rule.operator) => {
                    findings.push(PolicyError::UnsupportedOperator(rule.operator.clone()));
                }
                _ => {}
            }
        }

        for finding in &findings {
            warn!("Policy {}: {}", self.name, finding);
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Comparable;
    use crate::value::Object;

    #[derive(Serialize)]
    struct Person {
        #[serde(rename = "Age")]
        age: u32,
        #[serde(rename = "Active")]
        active: bool,
    }

    fn age_and_active() -> Policy {
        Policy::new(
            "adult-active",
            vec![Rule::new("Age", "==", 30), Rule::new("Active", "==", true)],
        )
    }

    #[test]
    fn test_all_rules_must_hold() {
        let policy = age_and_active();
        assert!(policy.evaluate(&Person { age: 30, active: true }));
        assert!(!policy.evaluate(&Person { age: 30, active: false }));
        assert!(!policy.evaluate(&Person { age: 31, active: true }));
    }

    #[test]
    fn test_empty_policy_allows_records() {
        let policy = Policy::new("open", Vec::new());
        assert!(policy.evaluate_value(&Value::from(Object::new())));
        assert!(!policy.evaluate_value(&Value::from(42)));
    }

    #[test]
    fn test_scalar_resource_is_denied() {
        let policy = Policy::new("p", vec![Rule::new("Age", "==", 30)]);
        let evaluation = policy.explain(&Value::from("just text"));
        assert!(!evaluation.allowed);
        assert!(matches!(
            evaluation.denial,
            Some(Denial::Resource {
                reason: DenialReason::Error(PolicyError::InvalidResource(_))
            })
        ));
    }

    #[test]
    fn test_optional_root_is_dereferenced() {
        let policy = age_and_active();
        let resource = Value::from(Some(Value::from(
            Object::new().with("Age", 30).with("Active", true),
        )));
        assert!(policy.evaluate_value(&resource));
    }

    #[test]
    fn test_nested_any() {
        let policy = Policy::new(
            "any-status",
            vec![Rule::any(
                "Nested",
                vec![
                    Rule::new("Status", "==", "active"),
                    Rule::new("Status", "==", "inactive"),
                ],
            )],
        );
        let resource = Value::from(Object::new().with(
            "Nested",
            vec![
                Value::from(Object::new().with("Status", "active")),
                Value::from(Object::new().with("Status", "inactive")),
            ],
        ));
        assert!(policy.evaluate_value(&resource));

        let archived = Value::from(Object::new().with(
            "Nested",
            vec![Value::from(Object::new().with("Status", "archived"))],
        ));
        assert!(!policy.evaluate_value(&archived));
    }

    #[test]
    fn test_nested_any_tolerates_bad_elements() {
        let policy = Policy::new(
            "any-status",
            vec![Rule::any("Items", vec![Rule::new("Status", "==", "active")])],
        );
        let resource = Value::from(Object::new().with(
            "Items",
            vec![
                Value::from("not a record"),
                Value::from(Object::new().with_private("Status", "active")),
                Value::from(Some(Value::from(Object::new().with("Status", "active")))),
            ],
        ));
        assert!(policy.evaluate_value(&resource));
    }

    #[test]
    fn test_nested_any_needs_sequence() {
        let policy = Policy::new(
            "any-status",
            vec![Rule::any("Items", vec![Rule::new("Status", "==", "active")])],
        );
        let resource = Value::from(Object::new().with("Items", "active"));
        let evaluation = policy.explain(&resource);
        assert!(!evaluation.allowed);
        assert!(matches!(
            evaluation.denial.as_ref().map(Denial::reason).and_then(DenialReason::error),
            Some(PolicyError::TypeConversionFailure(_))
        ));
    }

    #[test]
    fn test_errors_deny() {
        let resource = Value::from(
            Object::new()
                .with("Name", "x")
                .with_private("Secret", "s"),
        );
        for rule in [
            Rule::new("Missing", "==", "x"),
            Rule::new("Secret", "==", "s"),
            Rule::new("Name", "bogus-op", "x"),
            Rule::new("Name", ANY, "x"),
        ] {
            let policy = Policy::new("p", vec![rule]);
            let evaluation = policy.explain(&resource);
            assert!(!evaluation.allowed);
            assert!(evaluation.denial.unwrap().reason().error().is_some());
        }
    }

    #[test]
    fn test_explain_reports_first_failing_rule() {
        let policy = age_and_active();
        let resource = Value::from(Object::new().with("Age", 30).with("Active", false));
        let evaluation = policy.explain(&resource);

        assert_eq!(evaluation.policy, "adult-active");
        assert!(!evaluation.allowed);
        match evaluation.denial {
            Some(Denial::Rule {
                rule_index,
                field,
                operator,
                reason,
            }) => {
                assert_eq!(rule_index, 1);
                assert_eq!(field, "Active");
                assert_eq!(operator, "==");
                assert!(reason.is_mismatch());
            }
            other => panic!("unexpected denial {:?}", other),
        }

        let resource = Value::from(Object::new().with("Age", 30).with("Active", true));
        let allowed = policy.explain(&resource);
        assert!(allowed.allowed);
        assert!(allowed.denial.is_none());
    }

    #[test]
    fn test_evaluate_agrees_with_explain() {
        let registry = OperatorRegistry::shared();
        let policies = [
            age_and_active(),
            Policy::new("empty", Vec::new()),
            Policy::new("missing", vec![Rule::new("Missing", "==", 1)]),
            Policy::new("bogus", vec![Rule::new("Age", "bogus-op", 30)]),
            Policy::new(
                "any",
                vec![Rule::any("Tags", vec![Rule::new("Name", "==", "x")])],
            ),
        ];
        let resources = [
            Value::from(Object::new().with("Age", 30).with("Active", true)),
            Value::from(Object::new().with("Age", 30).with("Active", false)),
            Value::from(vec![Value::from(1)]),
            Value::from("scalar"),
            Value::Null,
        ];

        for policy in &policies {
            for resource in &resources {
                assert_eq!(
                    policy.evaluate_with(&registry, resource),
                    policy.explain_with(&registry, resource).allowed,
                    "policy {} on {}",
                    policy.name,
                    resource
                );
            }
        }
    }

    #[test]
    fn test_custom_registry() {
        let registry = OperatorRegistry::builder()
            .with_operator("~=", |l: &Comparable, r: &Comparable| match (l, r) {
                (Comparable::Text(a), Comparable::Text(b)) => a.eq_ignore_ascii_case(b),
                _ => l.equals(r),
            })
            .build();
        let policy = Policy::new("ci", vec![Rule::new("Name", "~=", "ADMIN")]);
        let resource = Value::from(Object::new().with("Name", "admin"));

        assert!(policy.evaluate_with(&registry, &resource));
        assert!(!policy.evaluate_value(&resource));
    }

    #[test]
    fn test_from_json() {
        let policy = Policy::from_json(
            r#"{
                "Name": "finalized",
                "Rules": [
                    {"Field": "Status", "Operator": "==", "Value": "final"},
                    {"Field": "Tags", "Operator": "in", "Value": ["a", "b"]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(policy.name, "finalized");
        assert_eq!(policy.rules.len(), 2);

        let lowercase = Policy::from_json(r#"{"name": "empty"}"#).unwrap();
        assert!(lowercase.rules.is_empty());

        assert!(matches!(
            Policy::from_json(r#"{"Rules": []}"#),
            Err(PolicyError::Json(_))
        ));
    }

    #[test]
    fn test_validate() {
        let registry = OperatorRegistry::new();
        let policy = Policy::new(
            "mixed",
            vec![
                Rule::new("A", "==", 1),
                Rule::new("B", "=~", 1),
                Rule::new("C", ANY, 1),
                Rule::any("D", vec![Rule::new("E", "<>", 1)]),
                Rule::any("F", vec![Rule::any("G", Vec::new())]),
            ],
        );

        let findings = policy.validate(&registry);
        assert_eq!(findings.len(), 4);
        assert!(matches!(&findings[0], PolicyError::UnsupportedOperator(op) if op == "=~"));
        assert!(matches!(findings[1], PolicyError::InvalidRule(_)));
        assert!(matches!(&findings[2], PolicyError::UnsupportedOperator(op) if op == "<>"));
        assert!(matches!(findings[3], PolicyError::InvalidRule(_)));

        assert!(age_and_active().validate(&registry).is_empty());
    }

    #[test]
    fn test_deeply_nested_any_is_denied() {
        let policy = Policy::new(
            "deep",
            vec![Rule::any(
                "Items",
                vec![Rule::any("Parts", vec![Rule::new("Id", "==", 1)])],
            )],
        );
        let resource = Value::from(Object::new().with(
            "Items",
            vec![Value::from(Object::new().with(
                "Parts",
                vec![Value::from(Object::new().with("Id", 1))],
            ))],
        ));
        assert!(!policy.evaluate_value(&resource));
    }
}
