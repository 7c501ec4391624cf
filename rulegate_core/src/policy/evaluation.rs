//! Rule-by-rule evaluation of a policy against a resource.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use super::rule::{Rule, RuleValue, ANY};
use super::Policy;
use crate::error::{PolicyError, Result};
use crate::operators::OperatorRegistry;
use crate::resolver::resolve;
use crate::value::Value;

/// Outcome of evaluating one policy, with the reason for a denial.
#[derive(Debug, Serialize)]
pub struct Evaluation {
    pub policy: String,
    pub allowed: bool,
    pub denial: Option<Denial>,
    pub evaluated_at: DateTime<Utc>,
}

/// Where and why a policy denied a resource.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    /// The resource itself is not a record or sequence.
    Resource { reason: DenialReason },
    /// The first rule that did not hold.
    Rule {
        rule_index: usize,
        field: String,
        operator: String,
        reason: DenialReason,
    },
}

impl Denial {
    pub fn reason(&self) -> &DenialReason {
        match self {
            Denial::Resource { reason } | Denial::Rule { reason, .. } => reason,
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::Resource { reason } => write!(f, "resource rejected: {}", reason),
            Denial::Rule {
                rule_index,
                field,
                operator,
                reason,
            } => write!(
                f,
                "rule #{} ({} {}) failed: {}",
                rule_index, field, operator, reason
            ),
        }
    }
}

#[derive(Debug)]
pub enum DenialReason {
    /// The rule was evaluated and did not hold.
    Mismatch,
    /// The rule could not be evaluated.
    Error(PolicyError),
}

impl DenialReason {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, DenialReason::Mismatch)
    }

    pub fn error(&self) -> Option<&PolicyError> {
        match self {
            DenialReason::Error(err) => Some(err),
            DenialReason::Mismatch => None,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Mismatch => write!(f, "value did not match"),
            DenialReason::Error(err) => write!(f, "{}", err),
        }
    }
}

impl Serialize for DenialReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Evaluate `policy` and record the outcome.
pub(crate) fn evaluate(policy: &Policy, registry: &OperatorRegistry, resource: &Value) -> Evaluation {
    let evaluated_at = Utc::now();
    let denial = first_failure(policy, registry, resource);
    Evaluation {
        policy: policy.name.clone(),
        allowed: denial.is_none(),
        denial,
        evaluated_at,
    }
}

/// Check every rule of `policy` in order, stopping at the first failure.
/// `None` means the policy allows `resource`.
pub(crate) fn first_failure(
    policy: &Policy,
    registry: &OperatorRegistry,
    resource: &Value,
) -> Option<Denial> {
    let root = resource.deref_optional();
    if !(root.is_record() || root.is_sequence()) {
        let err = PolicyError::InvalidResource(root.kind().to_string());
        debug!("Policy {} rejected resource: {}", policy.name, err);
        return Some(Denial::Resource {
            reason: DenialReason::Error(err),
        });
    }

    policy.rules.iter().enumerate().find_map(|(index, rule)| {
        let reason = match check_rule(registry, rule, root, false) {
            Ok(true) => return None,
            Ok(false) => DenialReason::Mismatch,
            Err(err) => {
                debug!(
                    "Policy {} rule #{} ({} {}) failed: {}",
                    policy.name, index, rule.field, rule.operator, err
                );
                DenialReason::Error(err)
            }
        };
        Some(Denial::Rule {
            rule_index: index,
            field: rule.field.clone(),
            operator: rule.operator.clone(),
            reason,
        })
    })
}

fn check_rule(
    registry: &OperatorRegistry,
    rule: &Rule,
    resource: &Value,
    nested: bool,
) -> Result<bool> {
    match &rule.value {
        RuleValue::Nested(rules) => {
            if nested || rule.operator != ANY {
                return Err(PolicyError::InvalidRule(format!(
                    "nested rules on {} need a top-level '{}' operator",
                    rule.field, ANY
                )));
            }
            check_any(registry, rule, rules, resource)
        }
        _ if rule.operator == ANY => Err(PolicyError::InvalidRule(format!(
            "'{}' on field {} needs a list of rules",
            ANY, rule.field
        ))),
        value => {
            let left = resolve(resource, &rule.field)?;
            let right = value.operand().ok_or_else(|| {
                PolicyError::InvalidRule(format!("rule on {} has no operand", rule.field))
            })?;
            registry.dispatch(&rule.operator, left, right)
        }
    }
}

fn check_any(
    registry: &OperatorRegistry,
    rule: &Rule,
    rules: &[Rule],
    resource: &Value,
) -> Result<bool> {
    let target = resolve(resource, &rule.field)?.deref_optional();
    let elements = target.as_list().ok_or_else(|| {
        PolicyError::TypeConversionFailure(format!(
            "field {} is {}, not a sequence",
            rule.field,
            target.kind()
        ))
    })?;

    let matched = elements.iter().any(|element| {
        let element = element.deref_optional();
        rules
            .iter()
            .any(|inner| match check_rule(registry, inner, element, true) {
                Ok(matched) => matched,
                Err(err) => {
                    debug!(
                        "Nested rule {} {} under {} failed: {}",
                        inner.field, inner.operator, rule.field, err
                    );
                    false
                }
            })
    });
    Ok(matched)
}
