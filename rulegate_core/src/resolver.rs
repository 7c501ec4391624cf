//! Field path resolution.
//!
//! A path is a dot-separated list of segments, each either `name` or
//! `name[index]`. Lookup goes through the [`Fields`] capability, implemented
//! once per container shape: objects by field name, maps by literal key and
//! sequences by numeric position.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{PolicyError, Result};
use crate::value::{Object, Value};

/// Outcome of a single named lookup.
pub(crate) enum Lookup<'a> {
    Found(&'a Value),
    Missing,
    Private,
}

/// Named access into a container value.
pub(crate) trait Fields {
    /// Keyed containers match the whole segment text literally, brackets included.
    fn keyed(&self) -> bool {
        false
    }

    fn get(&self, name: &str) -> Lookup<'_>;
}

impl Fields for Object {
    fn get(&self, name: &str) -> Lookup<'_> {
        match Object::get(self, name) {
            Some(field) if field.is_public() => Lookup::Found(field.value()),
            Some(_) => Lookup::Private,
            None => Lookup::Missing,
        }
    }
}

impl Fields for BTreeMap<String, Value> {
    fn keyed(&self) -> bool {
        true
    }

    fn get(&self, name: &str) -> Lookup<'_> {
        match BTreeMap::get(self, name) {
            Some(value) => Lookup::Found(value),
            None => Lookup::Missing,
        }
    }
}

impl Fields for Vec<Value> {
    fn get(&self, name: &str) -> Lookup<'_> {
        match name.parse::<usize>().ok().and_then(|i| self.as_slice().get(i)) {
            Some(value) => Lookup::Found(value),
            None => Lookup::Missing,
        }
    }
}

fn fields_of(value: &Value) -> Option<&dyn Fields> {
    match value {
        Value::Object(object) => Some(object),
        Value::Map(map) => Some(map),
        Value::List(items) => Some(items),
        _ => None,
    }
}

/// Resolve `path` against `resource`.
///
/// Optional wrappers met on the way are stripped before descending; the
/// value at the final segment is returned as stored.
pub fn resolve<'a>(resource: &'a Value, path: &str) -> Result<&'a Value> {
    if path.is_empty() {
        return Err(PolicyError::InvalidPath(path.to_string()));
    }

    let segments: Vec<&str> = path.split('.').collect();
    let last = segments.len() - 1;
    let mut current = resource;

    for (i, segment) in segments.into_iter().enumerate() {
        if segment.is_empty() {
            return Err(PolicyError::InvalidPath(path.to_string()));
        }
        current = step(current, segment, path)?;
        if i < last {
            current = current.deref_optional();
        }
    }

    trace!("Resolved {} to {}", path, current.kind());
    Ok(current)
}

fn step<'a>(current: &'a Value, segment: &str, path: &str) -> Result<&'a Value> {
    let fields = match fields_of(current) {
        Some(fields) => fields,
        None if current.is_null() => return Err(PolicyError::NilValue(segment.to_string())),
        None => return Err(PolicyError::FieldNotFound(segment.to_string())),
    };

    if fields.keyed() {
        return lookup(fields, segment);
    }

    match split_index(segment, path)? {
        Some((name, index)) => {
            let target = lookup(fields, name)?.deref_optional();
            if target.is_null() {
                return Err(PolicyError::NilValue(name.to_string()));
            }
            let items = target.as_list().ok_or_else(|| {
                PolicyError::TypeConversionFailure(format!(
                    "field {} is {}, not a sequence",
                    name,
                    target.kind()
                ))
            })?;
            items.get(index).ok_or_else(|| PolicyError::IndexOutOfBounds {
                field: name.to_string(),
                index,
                len: items.len(),
            })
        }
        None => lookup(fields, segment),
    }
}

fn lookup<'a>(fields: &'a dyn Fields, name: &str) -> Result<&'a Value> {
    match fields.get(name) {
        Lookup::Found(value) => Ok(value),
        Lookup::Missing => Err(PolicyError::FieldNotFound(name.to_string())),
        Lookup::Private => Err(PolicyError::AccessDenied(name.to_string())),
    }
}

/// Split `name[index]` into its parts. Plain names yield `None`.
fn split_index<'s>(segment: &'s str, path: &str) -> Result<Option<(&'s str, usize)>> {
    let Some(open) = segment.find('[') else {
        return Ok(None);
    };
    let invalid = || PolicyError::InvalidPath(path.to_string());

    let name = &segment[..open];
    let index = segment[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
    if name.is_empty() {
        return Err(invalid());
    }
    let index = index.parse::<usize>().map_err(|_| invalid())?;
    Ok(Some((name, index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn resource() -> Value {
        let mut limits = BTreeMap::new();
        limits.insert("cpu".to_string(), Value::from(4));
        limits.insert("Tags[0]".to_string(), Value::from("literal"));

        let owner = Object::new()
            .with("Name", "ops")
            .with_private("token", "s3cr3t");

        Value::from(
            Object::new()
                .with("Name", "asset")
                .with("Tags", vec!["a", "b"])
                .with(
                    "Items",
                    vec![
                        Value::from(Object::new().with("Sku", "x-1")),
                        Value::from(Object::new().with("Sku", "x-2")),
                    ],
                )
                .with("Limits", Value::Map(limits))
                .with("Owner", Some(Value::from(owner)))
                .with("Score", Some(10_i64))
                .with("Parent", Value::Null),
        )
    }

    #[test]
    fn test_plain_and_nested_fields() {
        let resource = resource();
        assert_eq!(resolve(&resource, "Name").unwrap(), &Value::from("asset"));
        assert_eq!(resolve(&resource, "Owner.Name").unwrap(), &Value::from("ops"));
        assert_eq!(resolve(&resource, "Limits.cpu").unwrap(), &Value::from(4));
    }

    #[test]
    fn test_indexed_segments() {
        let resource = resource();
        assert_eq!(resolve(&resource, "Tags[1]").unwrap(), &Value::from("b"));
        assert_eq!(resolve(&resource, "Items[0].Sku").unwrap(), &Value::from("x-1"));
        assert_eq!(resolve(&resource, "Items.1.Sku").unwrap(), &Value::from("x-2"));
    }

    #[test]
    fn test_map_uses_literal_key() {
        let resource = resource();
        assert_eq!(
            resolve(&resource, "Limits.Tags[0]").unwrap(),
            &Value::from("literal")
        );
    }

    #[test]
    fn test_terminal_optional_is_not_stripped() {
        let resource = resource();
        assert_eq!(
            resolve(&resource, "Score").unwrap(),
            &Value::Optional(Box::new(Value::from(10)))
        );
    }

    #[test]
    fn test_errors() {
        let resource = resource();
        assert!(matches!(
            resolve(&resource, "Missing"),
            Err(PolicyError::FieldNotFound(name)) if name == "Missing"
        ));
        assert!(matches!(
            resolve(&resource, "Limits.memory"),
            Err(PolicyError::FieldNotFound(_))
        ));
        assert!(matches!(
            resolve(&resource, "Tags[2]"),
            Err(PolicyError::IndexOutOfBounds { index: 2, len: 2, .. })
        ));
        assert!(matches!(
            resolve(&resource, "Owner.token"),
            Err(PolicyError::AccessDenied(name)) if name == "token"
        ));
        assert!(matches!(
            resolve(&resource, "Name[0]"),
            Err(PolicyError::TypeConversionFailure(_))
        ));
        assert!(matches!(
            resolve(&resource, "Parent.Name"),
            Err(PolicyError::NilValue(_))
        ));
        assert!(matches!(
            resolve(&resource, "Name.Length"),
            Err(PolicyError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_paths() {
        let resource = resource();
        for path in ["", "Name.", ".Name", "Tags[x]", "Tags[1", "[0]", "Tags[-1]"] {
            assert!(
                matches!(resolve(&resource, path), Err(PolicyError::InvalidPath(_))),
                "path {:?} should be rejected",
                path
            );
        }
    }
}
