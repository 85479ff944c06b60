//! Text encodings accepted in a file's `encoding` field.

use base64::Engine;

use crate::errors::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// One byte per char, also accepted as `binary`.
    Latin1,
    Ascii,
    Base64,
}

impl TextEncoding {
    /// Resolve an encoding name, defaulting to utf-8.
    pub fn parse(name: Option<&str>) -> Result<Self, DriverError> {
        let Some(name) = name else {
            return Ok(Self::Utf8);
        };
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "latin1" | "binary" => Ok(Self::Latin1),
            "ascii" => Ok(Self::Ascii),
            "base64" => Ok(Self::Base64),
            other => Err(DriverError::invalid(format!("Unsupported encoding: {other}"))),
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> Result<String, DriverError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes).map_err(|e| {
                DriverError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }),
            Self::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
            Self::Ascii => Ok(bytes.into_iter().map(|b| char::from(b & 0x7f)).collect()),
            Self::Base64 => Ok(base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, DriverError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            // Chars above U+00FF keep only their low byte.
            Self::Latin1 | Self::Ascii => Ok(text.chars().map(|c| c as u32 as u8).collect()),
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| DriverError::invalid(format!("Invalid base64 text: {e}"))),
        }
    }
}
