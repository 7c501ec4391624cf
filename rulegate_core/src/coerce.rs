//! Scalar coercion.
//!
//! Operands are normalized before scalar comparison so that `"30" == 30`
//! holds while strings that do not parse as numbers still compare
//! lexicographically.

use std::cmp::Ordering;

use crate::value::Value;

/// A scalar normalized for comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparable {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    Text(String),
}

impl Comparable {
    pub fn is_number(&self) -> bool {
        matches!(self, Comparable::Integer(_) | Comparable::Float(_))
    }

    /// Canonical equality. Integers and floats compare numerically; every
    /// other pairing of different kinds is unequal.
    pub fn equals(&self, other: &Comparable) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Float(a), Comparable::Float(b)) => a == b,
            (Comparable::Integer(i), Comparable::Float(f))
            | (Comparable::Float(f), Comparable::Integer(i)) => {
                compare_integer_float(*i, *f) == Some(Ordering::Equal)
            }
            (Comparable::Text(a), Comparable::Text(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering between two numbers or two strings. Anything else has no order.
    pub fn compare(&self, other: &Comparable) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Integer(a), Comparable::Integer(b)) => Some(a.cmp(b)),
            (Comparable::Integer(a), Comparable::Float(b)) => compare_integer_float(*a, *b),
            (Comparable::Float(a), Comparable::Integer(b)) => {
                compare_integer_float(*b, *a).map(Ordering::reverse)
            }
            (Comparable::Float(a), Comparable::Float(b)) => a.partial_cmp(b),
            (Comparable::Text(a), Comparable::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the
/// integer through `f64`.
fn compare_integer_float(i: i128, f: f64) -> Option<Ordering> {
    // i128::MAX as f64 rounds up to 2^127, which no i128 reaches.
    const BOUND: f64 = i128::MAX as f64;
    if f.is_nan() {
        return None;
    }
    if f >= BOUND {
        return Some(Ordering::Less);
    }
    if f < -BOUND {
        return Some(Ordering::Greater);
    }

    let whole = f.trunc();
    match i.cmp(&(whole as i128)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)),
        other => Some(other),
    }
}

/// Normalize a value for scalar comparison.
///
/// One optional level is stripped first. Text that parses as an integer, or
/// failing that as a finite float, becomes that number. Numbers, booleans and
/// null pass through. Sequences and records become their canonical string.
pub fn coerce(value: &Value) -> Comparable {
    match value.deref_optional() {
        Value::Null => Comparable::Null,
        Value::Bool(b) => Comparable::Bool(*b),
        Value::Int(i) => Comparable::Integer(i128::from(*i)),
        Value::UInt(u) => Comparable::Integer(i128::from(*u)),
        Value::Float(x) => Comparable::Float(*x),
        Value::Text(text) => parse_text(text),
        other => Comparable::Text(other.to_string()),
    }
}

fn parse_text(text: &str) -> Comparable {
    if let Ok(i) = text.parse::<i128>() {
        return Comparable::Integer(i);
    }
    match text.parse::<f64>() {
        Ok(x) if x.is_finite() => Comparable::Float(x),
        _ => Comparable::Text(text.to_string()),
    }
}
