use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured result every parser returns.
///
/// Serializes untagged, so `Mapping` becomes a JSON object, `Sequence` a JSON
/// array and so on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// Empty mapping, the shape of `{}`
    pub fn mapping() -> Self {
        Value::Mapping(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when this value is a mapping
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping()?.get(key)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Mapping(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                // u64 above i64::MAX and real numbers
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Mapping(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_shape() {
        let value = Value::from(json!({
            "name": "order",
            "fields": [{"id": 1}, {"ratio": 0.5}],
            "flag": true,
            "none": null
        }));

        assert_eq!(value.get("name").and_then(Value::as_str), Some("order"));
        let fields = value.get("fields").and_then(Value::as_sequence).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(fields[1].get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(value.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(value.get("none"), Some(&Value::Null));
    }

    #[test]
    fn test_untagged_serialization() {
        let value: Value = vec![
            ("a".to_string(), Value::from(vec![1i64, 2])),
            ("b".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":[1,2],"b":null}"#);
    }

    #[test]
    fn test_deserialize_picks_integer_before_float() {
        let value: Value = serde_json::from_str("[3, 3.5]").unwrap();
        assert_eq!(value, Value::from(vec![Value::Integer(3), Value::Float(3.5)]));
    }
}
