//! Document field access
//!
//! Dotted-path reads with implicit array traversal (for matching) and
//! dotted-path writes that create intermediate containers (for `$set`).

use docshift_core::{Document, StoreError};
use serde_json::{Map, Value};

/// Split a dotted path, rejecting empty segments
///
/// # Errors
/// - `StoreError::InvalidUpdate` for an empty path or segment
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(StoreError::InvalidUpdate(format!(
            "field path '{path}' contains an empty segment"
        )));
    }
    Ok(parts)
}

/// Collect every value reachable at `path`
///
/// Arrays met before the last segment are traversed element by element
/// unless the segment is a numeric index. An array at the end contributes
/// itself and each of its elements.
#[must_use]
pub fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    let Some((head, rest)) = parts.split_first() else {
        return found;
    };
    if let Some(value) = document.get(*head) {
        collect(value, rest, &mut found);
    }
    found
}

fn collect<'a>(value: &'a Value, rest: &[&str], found: &mut Vec<&'a Value>) {
    let Some((head, tail)) = rest.split_first() else {
        found.push(value);
        if let Value::Array(items) = value {
            found.extend(items.iter());
        }
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, tail, found);
            }
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    collect(item, tail, found);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| item.is_object()) {
                    collect(item, rest, found);
                }
            }
        },
        _ => {}
    }
}

/// Write `value` at a dotted path
///
/// Creates missing intermediate objects. A numeric segment addresses an
/// existing array, padding it with `null` when the index is past the end.
///
/// # Returns
/// Whether the document changed.
///
/// # Errors
/// - `StoreError::PathConflict` when a segment crosses a scalar
/// - `StoreError::InvalidUpdate` for an empty segment
pub fn set_path(document: &mut Document, path: &str, value: Value) -> Result<bool, StoreError> {
    let parts = segments(path)?;
    let Some((head, rest)) = parts.split_first() else {
        return Err(StoreError::InvalidUpdate("empty field path".into()));
    };

    if rest.is_empty() {
        let changed = document.get(*head) != Some(&value);
        document.insert((*head).to_string(), value);
        return Ok(changed);
    }

    let child = document
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    set_in(child, rest, value, path)
}

fn set_in(current: &mut Value, rest: &[&str], value: Value, path: &str) -> Result<bool, StoreError> {
    let Some((head, tail)) = rest.split_first() else {
        let changed = *current != value;
        *current = value;
        return Ok(changed);
    };

    match current {
        Value::Object(map) => {
            if tail.is_empty() {
                let changed = map.get(*head) != Some(&value);
                map.insert((*head).to_string(), value);
                return Ok(changed);
            }
            let child = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_in(child, tail, value, path)
        }
        Value::Array(items) => {
            let index = head.parse::<usize>().map_err(|_| conflict(path, head))?;
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            let slot = &mut items[index];
            if slot.is_null() && !tail.is_empty() {
                *slot = Value::Object(Map::new());
            }
            set_in(slot, tail, value, path)
        }
        _ => Err(conflict(path, head)),
    }
}

fn conflict(path: &str, field: &str) -> StoreError {
    StoreError::PathConflict {
        path: path.to_string(),
        field: field.to_string(),
    }
}

/// Copy the listed fields (plus `_id`) into a new document
///
/// Paths through arrays project each object element.
#[must_use]
pub fn project(document: &Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return document.clone();
    }

    let mut projected = Document::new();
    if let Some(id) = document.get(docshift_core::ID_FIELD) {
        projected.insert(docshift_core::ID_FIELD.to_string(), id.clone());
    }
    for field in fields {
        let parts: Vec<&str> = field.split('.').collect();
        copy_path(document, &parts, &mut projected);
    }
    projected
}

fn copy_path(source: &Map<String, Value>, parts: &[&str], target: &mut Map<String, Value>) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    let Some(value) = source.get(*head) else {
        return;
    };

    if rest.is_empty() {
        target.insert((*head).to_string(), value.clone());
        return;
    }

    match value {
        Value::Object(inner) => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(out) = entry {
                copy_path(inner, rest, out);
            }
        }
        Value::Array(items) => {
            let objects: Vec<&Map<String, Value>> =
                items.iter().filter_map(Value::as_object).collect();
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Array(vec![Value::Object(Map::new()); objects.len()]));
            if let Value::Array(out) = entry {
                for (item, slot) in objects.into_iter().zip(out.iter_mut()) {
                    if let Value::Object(slot) = slot {
                        copy_path(item, rest, slot);
                    }
                }
            }
        }
        _ => {}
    }
}
