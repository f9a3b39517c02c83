//! Decoding of stored request headers.
//!
//! Tasks keep their headers as an opaque encoded blob. The executor asks a
//! `HeaderDecoder` to turn that blob back into name/value pairs right before
//! a request is built. Encryption at rest lives outside this crate; plug a
//! decrypting decoder in through the trait.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while decoding a header blob.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The blob is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not a JSON object of strings.
    #[error("invalid header json: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded bytes are not UTF-8.
    #[error("header blob is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Turns an encoded header blob into header name/value pairs.
pub trait HeaderDecoder: Send + Sync {
    fn decode(&self, blob: &str) -> Result<HashMap<String, String>, DecodeError>;
}

/// Decoder for blobs that are plain JSON objects, e.g. `{"X-Token":"abc"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHeaderDecoder;

impl HeaderDecoder for JsonHeaderDecoder {
    fn decode(&self, blob: &str) -> Result<HashMap<String, String>, DecodeError> {
        Ok(serde_json::from_str(blob)?)
    }
}

/// Decoder for base64-wrapped JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64JsonDecoder;

impl Base64JsonDecoder {
    /// Encode headers into the blob format this decoder reads.
    pub fn encode(headers: &HashMap<String, String>) -> Result<String, DecodeError> {
        let json = serde_json::to_vec(headers)?;
        Ok(STANDARD.encode(json))
    }
}

impl HeaderDecoder for Base64JsonDecoder {
    fn decode(&self, blob: &str) -> Result<HashMap<String, String>, DecodeError> {
        let bytes = STANDARD.decode(blob.trim())?;
        let json = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&json)?)
    }
}
