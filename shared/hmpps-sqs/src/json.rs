//! Decoding of message bodies for reporting

use serde_json::{Map, Number, Value};

/// Key holding the raw body when a message is not a JSON object
pub const RAW_BODY_KEY: &str = "rawBody";

/// How numbers found in a message body are represented once decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberPolicy {
    /// Integers that fit in 64 bits stay integers, everything else is a float
    #[default]
    LongOrDouble,
    /// Every number becomes a float
    Double,
}

/// Decodes message bodies into generic JSON objects
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder {
    policy: NumberPolicy,
}

impl JsonDecoder {
    #[must_use]
    pub const fn new(policy: NumberPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> NumberPolicy {
        self.policy
    }

    /// Decodes a body into a key/value mapping
    ///
    /// Bodies that are not JSON objects are kept verbatim under [`RAW_BODY_KEY`].
    #[must_use]
    pub fn decode_object(&self, body: &str) -> Map<String, Value> {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| (key, self.apply(value)))
                .collect(),
            Ok(_) | Err(_) => {
                let mut map = Map::new();
                map.insert(RAW_BODY_KEY.to_string(), Value::String(body.to_string()));
                map
            }
        }
    }

    fn apply(&self, value: Value) -> Value {
        match value {
            Value::Number(number) => Value::Number(self.convert(number)),
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.apply(v)).collect()),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, self.apply(value)))
                    .collect(),
            ),
            other => other,
        }
    }

    fn convert(&self, number: Number) -> Number {
        match self.policy {
            NumberPolicy::LongOrDouble => {
                if number.is_i64() {
                    number
                } else {
                    number
                        .as_f64()
                        .and_then(Number::from_f64)
                        .unwrap_or(number)
                }
            }
            NumberPolicy::Double => number
                .as_f64()
                .and_then(Number::from_f64)
                .unwrap_or(number),
        }
    }
}
