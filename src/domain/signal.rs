// Live signal value domain model
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Last known value of a vehicle signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

/// Signal name (e.g. `Vehicle.Speed`) to its last known value
pub type SignalValueMap = BTreeMap<String, SignalValue>;

impl SignalValue {
    /// Only primitives are signal values; null, arrays and objects yield `None`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Convert a JSON object of signal values, skipping non-primitive entries
pub fn parse_signal_values(object: &Map<String, Value>) -> SignalValueMap {
    object
        .iter()
        .filter_map(|(name, value)| match SignalValue::from_json(value) {
            Some(v) => Some((name.clone(), v)),
            None => {
                tracing::debug!("Skipping non-primitive value for signal {}", name);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_signal_values_skips_non_primitives() {
        let raw = json!({
            "Vehicle.Speed": 42,
            "Vehicle.Body.Lights.IsLowBeamOn": true,
            "Vehicle.Cabin.Infotainment.Media.Played.Track": "intro",
            "Vehicle.Nested": {"a": 1},
            "Vehicle.Missing": null
        });

        let values = parse_signal_values(raw.as_object().unwrap());
        assert_eq!(values.len(), 3);
        assert_eq!(values["Vehicle.Speed"], SignalValue::from(42));
        assert_eq!(values["Vehicle.Body.Lights.IsLowBeamOn"], SignalValue::Bool(true));
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let mut values = SignalValueMap::new();
        values.insert("Vehicle.Speed".to_string(), SignalValue::from(10));
        values.insert("Vehicle.IsMoving".to_string(), SignalValue::from(true));

        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"{"Vehicle.IsMoving":true,"Vehicle.Speed":10}"#);
    }
}
