//! Sequence comparison and membership.
//!
//! Elements are compared by their canonical string form. A null sequence
//! (`None`) equals only another null sequence; it never equals an empty one.

use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// Haystacks longer than this are indexed into a set before lookup.
pub const DEFAULT_INDEX_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct SequenceComparator {
    index_threshold: usize,
}

impl Default for SequenceComparator {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_THRESHOLD)
    }
}

impl SequenceComparator {
    pub fn new(index_threshold: usize) -> Self {
        Self { index_threshold }
    }

    pub fn index_threshold(&self) -> usize {
        self.index_threshold
    }

    /// Order-agnostic multiset equality.
    pub fn same_elements(&self, left: Option<&[Value]>, right: Option<&[Value]>) -> bool {
        let (left, right) = match (left, right) {
            (None, None) => return true,
            (Some(left), Some(right)) => (left, right),
            _ => return false,
        };
        if left.len() != right.len() {
            return false;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for element in left {
            *counts.entry(element.to_string()).or_insert(0) += 1;
        }
        for element in right {
            match counts.get_mut(&element.to_string()) {
                Some(count) if *count > 0 => *count -= 1,
                _ => return false,
            }
        }
        counts.values().all(|count| *count == 0)
    }

    /// Ordered, index-wise equality.
    pub fn deep_equal(&self, left: Option<&[Value]>, right: Option<&[Value]>) -> bool {
        match (left, right) {
            (None, None) => true,
            (Some(left), Some(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right)
                        .all(|(a, b)| a.to_string() == b.to_string())
            }
            _ => false,
        }
    }

    /// Membership of `needle` in `haystack`.
    ///
    /// Large haystacks go through a one-time string set; the result is the
    /// same as the linear scan.
    pub fn contains(&self, needle: &Value, haystack: &[Value]) -> bool {
        let needle = needle.to_string();
        if haystack.len() > self.index_threshold {
            let index: HashSet<String> = haystack.iter().map(Value::to_string).collect();
            index.contains(&needle)
        } else {
            haystack.iter().any(|element| element.to_string() == needle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn test_same_elements_ignores_order() {
        let cmp = SequenceComparator::default();
        let a = list(&["a", "b"]);
        let b = list(&["b", "a"]);
        assert!(cmp.same_elements(Some(&a[..]), Some(&b[..])));
        assert!(!cmp.deep_equal(Some(&a[..]), Some(&b[..])));
    }

    #[test]
    fn test_same_elements_counts_duplicates() {
        let cmp = SequenceComparator::default();
        let a: Vec<Value> = vec![1, 2, 3, 2, 1].into_iter().map(Value::from).collect();
        let b: Vec<Value> = vec![3, 2, 1, 2, 1].into_iter().map(Value::from).collect();
        let c: Vec<Value> = vec![3, 3, 1, 2, 1].into_iter().map(Value::from).collect();
        assert!(cmp.same_elements(Some(&a[..]), Some(&b[..])));
        assert!(!cmp.same_elements(Some(&a[..]), Some(&c[..])));
    }

    #[test]
    fn test_length_mismatch() {
        let cmp = SequenceComparator::default();
        let a = list(&["a", "b", "c"]);
        let b = list(&["a", "b"]);
        assert!(!cmp.same_elements(Some(&a[..]), Some(&b[..])));
        assert!(!cmp.deep_equal(Some(&a[..]), Some(&b[..])));
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        let cmp = SequenceComparator::default();
        let empty: Vec<Value> = Vec::new();
        assert!(cmp.same_elements(None, None));
        assert!(cmp.same_elements(Some(&empty[..]), Some(&empty[..])));
        assert!(!cmp.same_elements(None, Some(&empty[..])));
        assert!(!cmp.same_elements(Some(&empty[..]), None));
        assert!(cmp.deep_equal(None, None));
        assert!(!cmp.deep_equal(None, Some(&empty[..])));
    }

    #[test]
    fn test_elements_compare_by_string_form() {
        let cmp = SequenceComparator::default();
        let a = vec![Value::from(1), Value::from("two")];
        let b = vec![Value::from("1"), Value::from("two")];
        assert!(cmp.deep_equal(Some(&a[..]), Some(&b[..])));
    }

    #[test]
    fn test_contains_small_and_indexed() {
        let cmp = SequenceComparator::default();
        let small = list(&["apple", "banana", "cherry"]);
        assert!(cmp.contains(&Value::from("banana"), &small));
        assert!(!cmp.contains(&Value::from("orange"), &small));

        let mut large: Vec<Value> = (0..27).map(|i| Value::from(format!("fruit-{}", i))).collect();
        large.extend(small.clone());
        assert!(large.len() > DEFAULT_INDEX_THRESHOLD);
        assert!(cmp.contains(&Value::from("banana"), &large));
        assert!(!cmp.contains(&Value::from("orange"), &large));
    }

    #[test]
    fn test_threshold_does_not_change_result() {
        let linear = SequenceComparator::new(usize::MAX);
        let indexed = SequenceComparator::new(0);
        let haystack = vec![Value::from(1), Value::from("x"), Value::Null];
        for needle in [Value::from("1"), Value::from("y"), Value::Null, Value::from(1)] {
            assert_eq!(
                linear.contains(&needle, &haystack),
                indexed.contains(&needle, &haystack)
            );
        }
    }
}
