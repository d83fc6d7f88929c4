//! Data templates
//!
//! A [`DataTemplate`] maps output field names to a [`FieldSpec`]. Raw JSON
//! templates use two string markers:
//! - `>>RANDOM` (the whole string) generates a fresh token per resolution
//! - `$$name` copies the value of `name` from the resolution context
//!
//! Everything else is a literal.

use crate::error::ValidationError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Marker value requesting a generated random token
pub const RANDOM_MARKER: &str = ">>RANDOM";

/// Prefix marking a reference to another field
pub const REFERENCE_PREFIX: &str = "$$";

/// How a single template field produces its value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Value written unchanged
    Literal(Value),
    /// Fresh unique token on every resolution
    Random,
    /// Value of another field in the same context
    Reference(String),
}

impl FieldSpec {
    /// Parse a raw template value
    ///
    /// Total: any value that is not a recognised marker is a literal.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if s == RANDOM_MARKER => Self::Random,
            Value::String(s) => match s.strip_prefix(REFERENCE_PREFIX) {
                Some(name) => Self::Reference(name.to_string()),
                None => Self::Literal(value.clone()),
            },
            other => Self::Literal(other.clone()),
        }
    }

    /// Check if resolution is non-deterministic
    #[inline]
    #[must_use]
    pub fn is_random(&self) -> bool {
        matches!(self, Self::Random)
    }
}

impl From<Value> for FieldSpec {
    fn from(value: Value) -> Self {
        Self::parse(&value)
    }
}

/// Mapping from output field name to [`FieldSpec`]
///
/// Never empty. Immutable for the duration of a migration.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTemplate(BTreeMap<String, FieldSpec>);

impl DataTemplate {
    /// Create template from field specs
    ///
    /// # Errors
    /// - `ValidationError::InvalidData` if no fields are given
    pub fn new(
        fields: impl IntoIterator<Item = (String, FieldSpec)>,
    ) -> Result<Self, ValidationError> {
        let fields: BTreeMap<_, _> = fields.into_iter().collect();
        if fields.is_empty() {
            return Err(ValidationError::InvalidData);
        }
        Ok(Self(fields))
    }

    /// Parse a raw JSON template
    ///
    /// # Errors
    /// - `ValidationError::InvalidData` unless `value` is a non-empty object
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value.as_object().ok_or(ValidationError::InvalidData)?;
        Self::new(
            map.iter()
                .map(|(key, raw)| (key.clone(), FieldSpec::parse(raw))),
        )
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(field, spec)` pairs in field-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get spec for a field
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.0.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_markers() {
        assert_eq!(FieldSpec::parse(&json!(">>RANDOM")), FieldSpec::Random);
        assert_eq!(
            FieldSpec::parse(&json!("$$aString")),
            FieldSpec::Reference("aString".into())
        );
        assert_eq!(
            FieldSpec::parse(&json!("$$")),
            FieldSpec::Reference(String::new())
        );
    }

    #[test]
    fn parse_near_markers_are_literals() {
        for raw in [">>RANDOMX", ">>random", ">>", " $$a", "a$$b", "$a"] {
            assert_eq!(
                FieldSpec::parse(&json!(raw)),
                FieldSpec::Literal(json!(raw)),
                "{raw} should be literal"
            );
        }
    }

    #[test]
    fn parse_non_strings_are_literals() {
        for raw in [json!(2), json!(true), json!([]), json!({}), json!(null), json!({ "k": "$$x" })] {
            assert_eq!(FieldSpec::parse(&raw), FieldSpec::Literal(raw.clone()));
        }
    }

    #[test]
    fn template_from_value() {
        let template = DataTemplate::from_value(&json!({
            "aString": "Some chars",
            "aNumber": 2,
            "copied": "$$aString",
            "generated": ">>RANDOM"
        }))
        .unwrap();

        assert_eq!(template.len(), 4);
        assert!(!template.is_empty());
        assert!(template.get("generated").unwrap().is_random());
        assert_eq!(
            template.get("copied"),
            Some(&FieldSpec::Reference("aString".into()))
        );
    }

    #[test]
    fn template_rejects_empty_and_non_objects() {
        assert_eq!(
            DataTemplate::from_value(&json!({})),
            Err(ValidationError::InvalidData)
        );
        assert_eq!(
            DataTemplate::from_value(&json!(["a"])),
            Err(ValidationError::InvalidData)
        );
        assert_eq!(
            DataTemplate::from_value(&json!("a")),
            Err(ValidationError::InvalidData)
        );
    }

    proptest! {
        #[test]
        fn prop_plain_strings_stay_literal(s in "[a-zA-Z0-9 _.-]{0,24}") {
            prop_assert_eq!(FieldSpec::parse(&json!(s.clone())), FieldSpec::Literal(json!(s)));
        }

        #[test]
        fn prop_reference_strips_prefix(name in "[a-zA-Z_][a-zA-Z0-9_.]{0,16}") {
            let raw = format!("$${name}");
            prop_assert_eq!(FieldSpec::parse(&json!(raw)), FieldSpec::Reference(name));
        }
    }
}
