//! Filter matching
//!
//! Evaluates match expressions against documents. Supported operators:
//! - Logical: `$and`, `$or`, `$nor`
//! - Field: `$exists`, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//!   `$nin`, `$type`
//!
//! A plain value is an equality test. Any other operator is rejected.

use crate::document::values_at;
use docshift_core::{Document, Filter, StoreError};
use serde_json::Value;
use std::cmp::Ordering;

/// Check if `document` matches `filter`
///
/// # Errors
/// - `StoreError::UnsupportedOperator` for unknown operators or malformed
///   operator arguments
pub fn matches(document: &Document, filter: &Filter) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(op.to_string()));
            }
            field => field_matches(&values_at(document, field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, value: &'a Value) -> Result<Vec<&'a Filter>, StoreError> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::UnsupportedOperator(format!("{operator} needs a non-empty array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::UnsupportedOperator(format!("{operator} entries must be objects")))
        })
        .collect()
}

/// Check if a condition is an operator expression (`{"$op": ...}`)
fn is_operator_expression(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn field_matches(found: &[&Value], condition: &Value) -> Result<bool, StoreError> {
    let Some(operators) = condition.as_object().filter(|_| is_operator_expression(condition)) else {
        return Ok(equals_any(found, condition));
    };

    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$exists" => {
                let wanted = argument.as_bool().unwrap_or_else(|| truthy(argument));
                found.is_empty() != wanted
            }
            "$eq" => equals_any(found, argument),
            "$ne" => !equals_any(found, argument),
            "$gt" => compare_any(found, argument, |o| o == Ordering::Greater),
            "$gte" => compare_any(found, argument, |o| o != Ordering::Less),
            "$lt" => compare_any(found, argument, |o| o == Ordering::Less),
            "$lte" => compare_any(found, argument, |o| o != Ordering::Greater),
            "$in" => set_argument(operator, argument)?
                .iter()
                .any(|candidate| equals_any(found, candidate)),
            "$nin" => !set_argument(operator, argument)?
                .iter()
                .any(|candidate| equals_any(found, candidate)),
            "$type" => {
                let wanted = argument
                    .as_str()
                    .ok_or_else(|| StoreError::UnsupportedOperator("$type needs a type name".into()))?;
                found.iter().any(|value| type_name(value) == wanted)
            }
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn set_argument<'a>(operator: &str, argument: &'a Value) -> Result<&'a Vec<Value>, StoreError> {
    argument
        .as_array()
        .ok_or_else(|| StoreError::UnsupportedOperator(format!("{operator} needs an array")))
}

/// Equality against any reachable value; `null` also matches a missing field
fn equals_any(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found.iter().any(|value| values_equal(value, expected))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare_any(found: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    found
        .iter()
        .filter_map(|value| compare(value, bound))
        .any(accept)
}

/// Order two values of the same kind; mixed kinds never compare
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
