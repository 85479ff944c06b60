//! Wire form of binary payloads: `{"_bin": "<base64>"}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Raw bytes carried inside a JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryPayload {
    #[serde(
        rename = "_bin",
        serialize_with = "serialize_base64",
        deserialize_with = "deserialize_base64"
    )]
    pub data: Vec<u8>,
}

impl BinaryPayload {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Recognize a `{"_bin": ...}` object, `None` for anything else.
    pub fn from_value(value: &Value) -> Option<Result<Self, base64::DecodeError>> {
        let encoded = value.as_object()?.get("_bin")?.as_str()?;
        Some(STANDARD.decode(encoded).map(Self::new))
    }
}

/// Encode bytes as a binary payload value.
pub fn binary_value(data: &[u8]) -> Value {
    json!({ "_bin": STANDARD.encode(data) })
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
