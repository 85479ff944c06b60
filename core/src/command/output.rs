//! Command results and their JSON form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::command::codec::binary_value;
use crate::http::{HttpBody, HttpResponse};
use crate::resource::SerializedResource;

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Unit,
    Bool(bool),
    Size(u64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Entries(Vec<SerializedResource>),
    Http(HttpResponse),
}

impl CommandOutput {
    /// JSON value returned to the caller. Bytes become `{"_bin": ...}`,
    /// timestamps RFC 3339 strings with millisecond precision.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Unit => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Size(n) => json!(n),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bytes(b) => binary_value(b),
            Self::DateTime(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Entries(entries) => {
                Value::Array(entries.iter().map(entry_value).collect())
            }
            Self::Http(response) => {
                let body = match &response.body {
                    None => Value::Null,
                    Some(HttpBody::Text(text)) => Value::String(text.clone()),
                    Some(HttpBody::Binary(bytes)) => binary_value(bytes),
                };
                json!({
                    "status": response.status,
                    "headers": response.headers,
                    "body": body,
                })
            }
        }
    }
}

fn entry_value(entry: &SerializedResource) -> Value {
    match entry {
        SerializedResource::Entry { path, kind } => json!({ "path": path, "type": kind }),
        SerializedResource::Url { url } => json!({ "url": url }),
    }
}
