//! Response body decoding

use crate::error::{Error, Result};
use serde_json::Value;

/// Longest body excerpt kept in a decode error
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Turns a raw response body into a structured value
pub trait Decoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Value>;
}

/// The default decoder: [`decode_json`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        decode_json(body)
    }
}

impl<F> Decoder for F
where
    F: Fn(&[u8]) -> Result<Value> + Send + Sync,
{
    fn decode(&self, body: &[u8]) -> Result<Value> {
        self(body)
    }
}

/// Parse a body as JSON. An empty (or all-whitespace) body decodes to `null`.
pub fn decode_json(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(body).map_err(|source| Error::Decode {
        source,
        body: String::from_utf8_lossy(body)
            .chars()
            .take(MAX_ERROR_BODY_LENGTH)
            .collect(),
    })
}
