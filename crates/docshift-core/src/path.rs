//! Dotted field paths
//!
//! Provides [`FieldPath`] for addressing fields inside documents and array
//! elements, e.g. `addOns.2.id`.

use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Path to a field inside a document
///
/// Segments are joined with `.`; a purely numeric segment addresses an array
/// element when the value at that point is an array.
///
/// # Examples
/// - `["addOns", "0", "id"]` → `addOns.0.id`
/// - `["fieldsData", "owner"]` → `fieldsData.owner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Empty path (the context itself)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Check if path is empty (root)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Append an array index, returning new path
    #[inline]
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        self.child(index.to_string())
    }

    /// Look up the value at this path inside `context`
    ///
    /// Objects are entered by key, arrays by numeric segment. There is no
    /// implicit fan-out over array elements.
    #[must_use]
    pub fn lookup<'a>(&self, context: &'a Value) -> Option<&'a Value> {
        let mut current = context;
        for segment in &self.0 {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = s
            .split('.')
            .map(|seg| {
                if seg.is_empty() {
                    Err(FieldPathError::EmptySegment)
                } else if seg.starts_with('$') {
                    Err(FieldPathError::OperatorSegment(seg.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

/// Errors related to field paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    /// Empty segment in path
    #[error("field path contains empty segment")]
    EmptySegment,

    /// Segment looks like an operator
    #[error("field path segment may not start with '$': {0}")]
    OperatorSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_from_str_valid() {
        let path: FieldPath = "addOns.0.id".parse().unwrap();
        assert_eq!(path, FieldPath::root().child("addOns").index(0).child("id"));
        assert!(!path.is_empty());
    }

    #[test]
    fn path_from_str_empty() {
        let path: FieldPath = "".parse().unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn path_from_str_empty_segment() {
        let result: Result<FieldPath, _> = "a..b".parse();
        assert_eq!(result, Err(FieldPathError::EmptySegment));
    }

    #[test]
    fn path_from_str_operator_segment() {
        let result: Result<FieldPath, _> = "a.$set".parse();
        assert!(matches!(result, Err(FieldPathError::OperatorSegment(_))));
    }

    #[test]
    fn path_child_and_index() {
        let path = FieldPath::root().child("addOns").index(2).child("id");
        assert_eq!(path.to_string(), "addOns.2.id");
    }

    #[test]
    fn lookup_nested_object_and_array() {
        let doc = json!({
            "fieldsData": { "owner": "ann" },
            "addOns": [{ "id": "a" }, { "id": "b" }]
        });

        let owner: FieldPath = "fieldsData.owner".parse().unwrap();
        assert_eq!(owner.lookup(&doc), Some(&json!("ann")));

        let second: FieldPath = "addOns.1.id".parse().unwrap();
        assert_eq!(second.lookup(&doc), Some(&json!("b")));
    }

    #[test]
    fn lookup_missing_is_none() {
        let doc = json!({ "addOns": [{ "id": "a" }] });
        let missing: FieldPath = "addOns.5.id".parse().unwrap();
        assert_eq!(missing.lookup(&doc), None);

        let through_scalar: FieldPath = "addOns.0.id.deeper".parse().unwrap();
        assert_eq!(through_scalar.lookup(&doc), None);

        // no implicit fan-out
        let fan_out: FieldPath = "addOns.id".parse().unwrap();
        assert_eq!(fan_out.lookup(&doc), None);
    }

    #[test]
    fn lookup_root_is_context() {
        let doc = json!({ "a": 1 });
        assert_eq!(FieldPath::root().lookup(&doc), Some(&doc));
    }
}
