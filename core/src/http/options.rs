//! Caller-facing options of `httpRequest`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::command::codec::BinaryPayload;
use crate::errors::DriverError;
use crate::resource::File;

/// How a buffered response body is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    #[serde(rename = "arraybuffer")]
    ArrayBuffer,
}

/// Credentials for the request. A bearer token wins over basic auth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Authentication {
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    #[serde(default, alias = "pass")]
    pub password: Option<String>,
    #[serde(default)]
    pub bearer: Option<String>,
}

/// A custom request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestBodyInput {
    Binary(BinaryPayload),
    Text(String),
    /// Objects and arrays are sent as JSON; other scalars are rejected.
    Json(Value),
}

fn default_gzip() -> bool {
    true
}

fn default_name_field() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    /// Verb used by `DOWNLOAD` (default `GET`).
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default = "default_gzip")]
    pub gzip: bool,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub body: Option<RequestBodyInput>,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub authentication: Option<Authentication>,
    /// Request timeout in milliseconds.
    #[serde(default, rename = "timeOut", alias = "timeout")]
    pub timeout: Option<u64>,
    /// Multipart field carrying the uploaded file.
    #[serde(default = "default_name_field", alias = "_nameField")]
    pub name_field: String,
    #[serde(default, alias = "_fileName")]
    pub file_name: Option<String>,
    #[serde(default, alias = "_fileContentType")]
    pub file_content_type: Option<String>,
    /// Download target or upload source; resolved from its descriptor by
    /// the dispatcher.
    #[serde(skip)]
    pub file: Option<File>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            method: None,
            response_type: ResponseType::default(),
            gzip: default_gzip(),
            params: Map::new(),
            headers: Map::new(),
            body: None,
            body_type: None,
            authentication: None,
            timeout: None,
            name_field: default_name_field(),
            file_name: None,
            file_content_type: None,
            file: None,
        }
    }
}

/// A custom body after validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CustomBody {
    Raw(Vec<u8>),
    Json(Vec<u8>),
}

impl HttpOptions {
    /// Header map with lowercased keys and stringified values.
    pub(crate) fn normalized_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), value_to_string(v)))
            .collect()
    }

    /// `params` as string pairs for forms, multipart fields and queries.
    pub(crate) fn param_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }

    /// Validate the custom body. Empty strings, `null`, `false` and `0`
    /// count as "no body".
    pub(crate) fn custom_body(&self) -> Result<Option<CustomBody>, DriverError> {
        let Some(body) = &self.body else {
            return Ok(None);
        };
        match body {
            RequestBodyInput::Binary(payload) => Ok(Some(CustomBody::Raw(payload.data.clone()))),
            RequestBodyInput::Text(text) if text.is_empty() => Ok(None),
            RequestBodyInput::Text(text) => Ok(Some(CustomBody::Raw(text.clone().into_bytes()))),
            RequestBodyInput::Json(Value::Null | Value::Bool(false)) => Ok(None),
            RequestBodyInput::Json(Value::Number(n)) if n.as_f64() == Some(0.0) => Ok(None),
            RequestBodyInput::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                let text = serde_json::to_vec(value).map_err(|e| {
                    DriverError::invalid(format!("Cannot stringify custom body: {e}"))
                })?;
                Ok(Some(CustomBody::Json(text)))
            }
            RequestBodyInput::Json(_) => Err(DriverError::invalid(
                "Custom body must be String, Object or ArrayBuffer",
            )),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
