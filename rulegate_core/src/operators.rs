//! Operator dispatch.
//!
//! The registry maps operator symbols to comparisons. It is assembled once
//! through [`OperatorRegistryBuilder`] and never changes afterwards, so a
//! single instance can be shared by every policy and enforcer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::trace;

use crate::coerce::{coerce, Comparable};
use crate::error::{PolicyError, Result};
use crate::sequence::{SequenceComparator, DEFAULT_INDEX_THRESHOLD};
use crate::value::Value;

/// A comparison between a resolved field and a rule operand.
pub trait Operator: Send + Sync {
    /// Compare two coerced scalars.
    fn compare(&self, left: &Comparable, right: &Comparable) -> bool;

    /// Compare when at least one operand is a sequence.
    fn compare_sequences(
        &self,
        _left: &Value,
        _right: &Value,
        _sequences: &SequenceComparator,
    ) -> bool {
        false
    }
}

impl<F> Operator for F
where
    F: Fn(&Comparable, &Comparable) -> bool + Send + Sync,
{
    fn compare(&self, left: &Comparable, right: &Comparable) -> bool {
        self(left, right)
    }
}

/// The operators every registry starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    In,
    NotIn,
}

impl Builtin {
    pub const ALL: [Builtin; 10] = [
        Builtin::Equal,
        Builtin::NotEqual,
        Builtin::StrictEqual,
        Builtin::StrictNotEqual,
        Builtin::Greater,
        Builtin::GreaterOrEqual,
        Builtin::Less,
        Builtin::LessOrEqual,
        Builtin::In,
        Builtin::NotIn,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Builtin::Equal => "==",
            Builtin::NotEqual => "!=",
            Builtin::StrictEqual => "===",
            Builtin::StrictNotEqual => "!==",
            Builtin::Greater => ">",
            Builtin::GreaterOrEqual => ">=",
            Builtin::Less => "<",
            Builtin::LessOrEqual => "<=",
            Builtin::In => "in",
            Builtin::NotIn => "not in",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Builtin {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        Builtin::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or_else(|| PolicyError::UnsupportedOperator(s.to_string()))
    }
}

/// `Some(None)` for a null sequence, `Some(Some(..))` for a list, `None` otherwise.
fn as_sequence(value: &Value) -> Option<Option<&[Value]>> {
    match value {
        Value::List(items) => Some(Some(items.as_slice())),
        Value::Null => Some(None),
        _ => None,
    }
}

impl Operator for Builtin {
    fn compare(&self, left: &Comparable, right: &Comparable) -> bool {
        match self {
            Builtin::Equal | Builtin::StrictEqual => left.equals(right),
            Builtin::NotEqual | Builtin::StrictNotEqual => !left.equals(right),
            Builtin::Greater => left.compare(right) == Some(Ordering::Greater),
            Builtin::GreaterOrEqual => {
                matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal))
            }
            Builtin::Less => left.compare(right) == Some(Ordering::Less),
            Builtin::LessOrEqual => {
                matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal))
            }
            Builtin::In | Builtin::NotIn => false,
        }
    }

    fn compare_sequences(
        &self,
        left: &Value,
        right: &Value,
        sequences: &SequenceComparator,
    ) -> bool {
        match self {
            Builtin::Equal | Builtin::NotEqual | Builtin::StrictEqual | Builtin::StrictNotEqual => {
                let (Some(l), Some(r)) = (as_sequence(left), as_sequence(right)) else {
                    return false;
                };
                match self {
                    Builtin::Equal => sequences.same_elements(l, r),
                    Builtin::NotEqual => !sequences.same_elements(l, r),
                    Builtin::StrictEqual => sequences.deep_equal(l, r),
                    _ => !sequences.deep_equal(l, r),
                }
            }
            Builtin::In | Builtin::NotIn => {
                let found = match (left.as_list(), right.as_list()) {
                    (Some(haystack), None) => sequences.contains(right, haystack),
                    (None, Some(haystack)) => sequences.contains(left, haystack),
                    _ => return false,
                };
                if *self == Builtin::In {
                    found
                } else {
                    !found
                }
            }
            _ => false,
        }
    }
}

lazy_static! {
    static ref SHARED_REGISTRY: Arc<OperatorRegistry> = Arc::new(OperatorRegistry::new());
}

/// Immutable table of operator symbols.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
    sequences: SequenceComparator,
}

impl OperatorRegistry {
    /// A registry holding only the built-in operators.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> OperatorRegistryBuilder {
        OperatorRegistryBuilder::new()
    }

    /// The process-wide default registry.
    pub fn shared() -> Arc<OperatorRegistry> {
        Arc::clone(&SHARED_REGISTRY)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.operators.contains_key(symbol)
    }

    /// Registered symbols in sorted order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.operators.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn sequences(&self) -> &SequenceComparator {
        &self.sequences
    }

    /// Apply the operator registered under `symbol` to two operands.
    ///
    /// Both operands lose one optional level. If either is then a sequence
    /// the sequence comparison is used, otherwise both are coerced and
    /// compared as scalars.
    pub fn dispatch(&self, symbol: &str, left: &Value, right: &Value) -> Result<bool> {
        let operator = self
            .operators
            .get(symbol)
            .ok_or_else(|| PolicyError::UnsupportedOperator(symbol.to_string()))?;

        let left = left.deref_optional();
        let right = right.deref_optional();

        if left.is_sequence() || right.is_sequence() {
            let outcome = operator.compare_sequences(left, right, &self.sequences);
            trace!("Sequence {} {} {} => {}", left.kind(), symbol, right.kind(), outcome);
            return Ok(outcome);
        }

        let (left, right) = (coerce(left), coerce(right));
        let outcome = operator.compare(&left, &right);
        trace!("Scalar {:?} {} {:?} => {}", left, symbol, right, outcome);
        Ok(outcome)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.symbols())
            .field("sequences", &self.sequences)
            .finish()
    }
}

/// Assembles an [`OperatorRegistry`].
pub struct OperatorRegistryBuilder {
    operators: HashMap<String, Arc<dyn Operator>>,
    index_threshold: usize,
}

impl OperatorRegistryBuilder {
    fn new() -> Self {
        let mut operators: HashMap<String, Arc<dyn Operator>> = HashMap::new();
        for builtin in Builtin::ALL {
            operators.insert(builtin.symbol().to_string(), Arc::new(builtin));
        }
        Self {
            operators,
            index_threshold: DEFAULT_INDEX_THRESHOLD,
        }
    }

    /// Register (or replace) the operator for `symbol`.
    pub fn with_operator(mut self, symbol: impl Into<String>, operator: impl Operator + 'static) -> Self {
        self.operators.insert(symbol.into(), Arc::new(operator));
        self
    }

    /// Sequence length above which membership checks build an index.
    pub fn with_index_threshold(mut self, index_threshold: usize) -> Self {
        self.index_threshold = index_threshold;
        self
    }

    pub fn build(self) -> OperatorRegistry {
        OperatorRegistry {
            operators: self.operators,
            sequences: SequenceComparator::new(self.index_threshold),
        }
    }
}
