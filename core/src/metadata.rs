//! Typed property bag attached to nodes.
//!
//! Values are restricted to a closed set of primitive kinds. Anything richer
//! (nested objects, lists of lists) has to go through [`coerce_json`], which
//! flattens it into text instead of rejecting the whole record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Node metadata, ordered by key so snapshots serialize deterministically.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single primitive that may appear inside a [`MetadataValue::List`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Scalar>),
}

impl Scalar {
    /// False for NaN or infinite floats, which JSON cannot represent.
    pub fn is_finite(&self) -> bool {
        match self {
            Scalar::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn to_flat_string(&self) -> String {
        match self {
            Scalar::Bool(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Text(v) => v.clone(),
        }
    }
}

impl MetadataValue {
    /// False when the value or any list item is a NaN or infinite float.
    pub fn is_finite(&self) -> bool {
        match self {
            MetadataValue::Float(v) => v.is_finite(),
            MetadataValue::List(items) => items.iter().all(Scalar::is_finite),
            _ => true,
        }
    }

    /// Render for sinks that only accept flat strings. Lists are joined with `", "`.
    pub fn to_flat_string(&self) -> String {
        match self {
            MetadataValue::Bool(v) => v.to_string(),
            MetadataValue::Int(v) => v.to_string(),
            MetadataValue::Float(v) => v.to_string(),
            MetadataValue::Text(v) => v.clone(),
            MetadataValue::List(items) => items
                .iter()
                .map(Scalar::to_flat_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(value.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<Vec<Scalar>> for MetadataValue {
    fn from(value: Vec<Scalar>) -> Self {
        MetadataValue::List(value)
    }
}

/// Coerce an arbitrary JSON value into the closed metadata kinds.
///
/// Rules: `null` yields `None`; numbers become `Int` when they fit an `i64`,
/// otherwise `Float`; objects become their compact JSON text; inside lists,
/// `null` items are dropped and nested lists/objects become JSON text.
pub fn coerce_json(value: Value) -> Option<MetadataValue> {
    match value {
        Value::Null => None,
        Value::Bool(v) => Some(MetadataValue::Bool(v)),
        Value::Number(n) => Some(number_value(&n)),
        Value::String(s) => Some(MetadataValue::Text(s)),
        Value::Array(items) => Some(MetadataValue::List(
            items.into_iter().filter_map(coerce_scalar).collect(),
        )),
        object @ Value::Object(_) => Some(MetadataValue::Text(object.to_string())),
    }
}

/// Coerce every entry of a JSON object, dropping `null` values.
pub fn coerce_json_object(object: serde_json::Map<String, Value>) -> Metadata {
    object
        .into_iter()
        .filter_map(|(key, value)| coerce_json(value).map(|v| (key, v)))
        .collect()
}

fn coerce_scalar(value: Value) -> Option<Scalar> {
    match value {
        Value::Null => None,
        Value::Bool(v) => Some(Scalar::Bool(v)),
        Value::Number(n) => Some(match number_value(&n) {
            MetadataValue::Int(v) => Scalar::Int(v),
            _ => Scalar::Float(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(Scalar::Text(s)),
        nested => Some(Scalar::Text(nested.to_string())),
    }
}

fn number_value(n: &serde_json::Number) -> MetadataValue {
    match n.as_i64() {
        Some(v) => MetadataValue::Int(v),
        None => MetadataValue::Float(n.as_f64().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_values_deserialize_to_expected_kinds() {
        let metadata: Metadata = serde_json::from_value(json!({
            "source": "paper.pdf",
            "page": 3,
            "score": 0.5,
            "public": true,
            "tags": ["graph", 2, false]
        }))
        .unwrap();

        assert_eq!(metadata["source"], MetadataValue::from("paper.pdf"));
        assert_eq!(metadata["page"], MetadataValue::Int(3));
        assert_eq!(metadata["score"], MetadataValue::Float(0.5));
        assert_eq!(metadata["public"], MetadataValue::Bool(true));
        assert_eq!(
            metadata["tags"],
            MetadataValue::List(vec![
                Scalar::Text("graph".into()),
                Scalar::Int(2),
                Scalar::Bool(false)
            ])
        );
    }

    #[test]
    fn non_finite_floats_are_flagged() {
        assert!(MetadataValue::Float(1.5).is_finite());
        assert!(!MetadataValue::Float(f64::INFINITY).is_finite());
        assert!(!MetadataValue::List(vec![Scalar::Int(1), Scalar::Float(f64::NAN)]).is_finite());
        assert!(MetadataValue::from("text").is_finite());
    }

    #[test]
    fn nested_objects_are_rejected_on_the_typed_path() {
        let result: Result<Metadata, _> = serde_json::from_value(json!({"nested": {"a": 1}}));
        assert!(result.is_err());
    }

    #[test]
    fn lenient_coercion_flattens_nested_structures() {
        let Value::Object(object) = json!({
            "nested": {"a": 1},
            "missing": null,
            "matrix": [[1, 2], null, "x"],
            "big": u64::MAX
        }) else {
            unreachable!()
        };

        let metadata = coerce_json_object(object);

        assert_eq!(metadata["nested"], MetadataValue::from(r#"{"a":1}"#));
        assert!(!metadata.contains_key("missing"));
        assert_eq!(
            metadata["matrix"],
            MetadataValue::List(vec![Scalar::Text("[1,2]".into()), Scalar::Text("x".into())])
        );
        assert!(matches!(metadata["big"], MetadataValue::Float(_)));
    }

    #[test]
    fn flat_string_joins_lists() {
        let value = MetadataValue::List(vec![Scalar::Text("a".into()), Scalar::Int(7)]);
        assert_eq!(value.to_flat_string(), "a, 7");
        assert_eq!(MetadataValue::Bool(false).to_flat_string(), "false");
    }
}
