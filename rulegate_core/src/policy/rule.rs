//! Rules and their operands.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::value::Value;

/// Structural marker for a rule whose value is a list of nested rules.
pub const ANY: &str = "any";

/// A single `field operator value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawRule")]
pub struct Rule {
    pub field: String,
    pub operator: String,
    pub value: RuleValue,
}

/// The right-hand side of a rule, classified once when the rule is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleValue {
    Scalar(Value),
    /// Always holds a [`Value::List`], so dispatch can borrow it as is.
    Sequence(Value),
    /// Only valid with the `any` operator.
    Nested(Vec<Rule>),
}

impl RuleValue {
    /// The operand handed to operator dispatch. Nested rules have none.
    pub fn operand(&self) -> Option<&Value> {
        match self {
            RuleValue::Scalar(value) | RuleValue::Sequence(value) => Some(value),
            RuleValue::Nested(_) => None,
        }
    }
}

impl From<Value> for RuleValue {
    fn from(value: Value) -> Self {
        match value {
            list @ Value::List(_) => RuleValue::Sequence(list),
            other => RuleValue::Scalar(other),
        }
    }
}

impl Rule {
    /// A comparison rule. List operands become [`RuleValue::Sequence`].
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: RuleValue::from(value.into()),
        }
    }

    /// An `any` rule: `field` must resolve to a sequence in which at least
    /// one element satisfies at least one of `rules`.
    pub fn any(field: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            field: field.into(),
            operator: ANY.to_string(),
            value: RuleValue::Nested(rules),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.value, RuleValue::Nested(_))
    }
}

/// Wire form of a rule before its value is classified.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRule {
    #[serde(alias = "field")]
    field: String,
    #[serde(alias = "operator")]
    operator: String,
    #[serde(alias = "value", default)]
    value: serde_json::Value,
}

impl TryFrom<RawRule> for Rule {
    type Error = PolicyError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        if raw.operator != ANY {
            return Ok(Rule::new(raw.field, raw.operator, Value::from(raw.value)));
        }

        let serde_json::Value::Array(items) = raw.value else {
            return Err(PolicyError::InvalidRule(format!(
                "'{}' on field {} needs a list of rules",
                ANY, raw.field
            )));
        };
        let mut nested = Vec::with_capacity(items.len());
        for item in items {
            let rule: Rule = serde_json::from_value(item).map_err(|e| {
                PolicyError::InvalidRule(format!("nested rule under {}: {}", raw.field, e))
            })?;
            if rule.is_nested() {
                return Err(PolicyError::InvalidRule(format!(
                    "'{}' rules cannot be nested under {}",
                    ANY, raw.field
                )));
            }
            nested.push(rule);
        }
        Ok(Rule::any(raw.field, nested))
    }
}
