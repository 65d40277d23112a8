//! Message codecs and trailer metadata.
//!
//! A codec owns everything the framework does not interpret: how
//! request and response values become bytes, and the declared content
//! type used for strict negotiation. The trailer format is part of
//! the codec interface because trailers travel inside the response
//! body, not as HTTP headers.
//!
//! [`JsonCodec`] is the default and currently only codec. Additional
//! codecs are drop-in implementations of [`Codec`].

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Trailer key carrying the final numeric status.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer key carrying the optional human-readable status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// A codec encode/decode failure.
///
/// Always reports the method whose payload was being processed;
/// decode failures on the server are transmitted as bare `internal`.
#[derive(Debug, Error)]
#[error("codec {operation} failed for method '{method}': {message}")]
pub struct CodecError {
    operation: &'static str,
    method: String,
    message: String,
}

impl CodecError {
    fn encode(method: &str, message: impl fmt::Display) -> Self {
        Self {
            operation: "encode",
            method: method.to_owned(),
            message: message.to_string(),
        }
    }

    fn decode(method: &str, message: impl fmt::Display) -> Self {
        Self {
            operation: "decode",
            method: method.to_owned(),
            message: message.to_string(),
        }
    }
}

/// Trailer metadata: the payload of a trailer frame.
///
/// Keys are case-insensitive (stored lowercased). The wire form is
/// CRLF-separated `name: value` lines; entries with empty values are
/// omitted on encode, and values are trimmed on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailerMap {
    entries: BTreeMap<String, String>,
}

impl TrailerMap {
    /// Create an empty trailer map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; the name is lowercased.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up an entry by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Set the `grpc-status` entry.
    pub fn set_grpc_status(&mut self, status: u32) {
        self.insert(GRPC_STATUS, status.to_string());
    }

    /// The parsed `grpc-status` entry, if present and numeric.
    #[must_use]
    pub fn grpc_status(&self) -> Option<u32> {
        self.get(GRPC_STATUS)?.parse().ok()
    }

    /// The raw `grpc-message` entry, if present.
    #[must_use]
    pub fn grpc_message(&self) -> Option<&str> {
        self.get(GRPC_MESSAGE)
    }

    /// Iterate entries in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Encodes and decodes the opaque payloads of one content type.
///
/// Request and message transforms take the method name so codecs can
/// key per-method behavior (and produce useful errors); the JSON
/// codec uses it for diagnostics only.
pub trait Codec: Clone + Send + Sync + 'static {
    /// The exact content type, used for HTTP `content-type`/`accept`
    /// and strict negotiation.
    fn content_type(&self) -> &'static str;

    /// Encode one request value.
    fn encode_request<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError>;

    /// Decode one request value.
    fn decode_request<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError>;

    /// Encode one response message.
    fn encode_message<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError>;

    /// Decode one response message.
    fn decode_message<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError>;

    /// Encode trailer metadata to its wire form.
    fn encode_trailer(&self, trailer: &TrailerMap) -> Bytes;

    /// Decode trailer metadata from its wire form.
    fn decode_trailer(&self, bytes: &[u8]) -> Result<TrailerMap, CodecError>;
}

/// The default JSON codec: `application/grpc-web+json`, UTF-8.
///
/// Every request and message must be a JSON root object; arrays and
/// bare scalars are rejected in both directions, as are values that
/// serialize to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn encode_object<T: Serialize>(method: &str, value: &T) -> Result<Bytes, CodecError> {
        let value = serde_json::to_value(value).map_err(|e| CodecError::encode(method, e))?;
        if !value.is_object() {
            return Err(CodecError::encode(
                method,
                "payload must serialize to a JSON object",
            ));
        }
        let bytes = serde_json::to_vec(&value).map_err(|e| CodecError::encode(method, e))?;
        Ok(Bytes::from(bytes))
    }

    fn decode_object<T: DeserializeOwned>(method: &str, bytes: &[u8]) -> Result<T, CodecError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::decode(method, e))?;
        if !value.is_object() {
            return Err(CodecError::decode(
                method,
                "payload must be a JSON object",
            ));
        }
        serde_json::from_value(value).map_err(|e| CodecError::decode(method, e))
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/grpc-web+json"
    }

    fn encode_request<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError> {
        Self::encode_object(method, value)
    }

    fn decode_request<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        Self::decode_object(method, bytes)
    }

    fn encode_message<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError> {
        Self::encode_object(method, value)
    }

    fn decode_message<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        Self::decode_object(method, bytes)
    }

    fn encode_trailer(&self, trailer: &TrailerMap) -> Bytes {
        let mut out = String::new();
        for (name, value) in trailer.iter() {
            if value.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\r\n");
            }
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
        }
        Bytes::from(out)
    }

    fn decode_trailer(&self, bytes: &[u8]) -> Result<TrailerMap, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::decode("<trailer>", e))?;
        let mut trailer = TrailerMap::new();
        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CodecError::decode("<trailer>", format!("malformed line {line:?}")))?;
            trailer.insert(name.trim(), value.trim());
        }
        Ok(trailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: i64,
    }

    #[test]
    fn test_message_round_trip() {
        let codec = JsonCodec;
        let bytes = codec.encode_message("increment", &Counter { value: 10 }).unwrap();
        let back: Counter = codec.decode_message("increment", &bytes).unwrap();
        assert_eq!(back, Counter { value: 10 });
    }

    #[test]
    fn test_content_type() {
        assert_eq!(JsonCodec.content_type(), "application/grpc-web+json");
    }

    #[test]
    fn test_non_object_roots_are_rejected() {
        let codec = JsonCodec;
        assert!(codec.encode_message("m", &[1, 2, 3]).is_err());
        assert!(codec.encode_message("m", &42).is_err());
        assert!(codec.encode_message("m", &Option::<Counter>::None).is_err());

        assert!(codec.decode_message::<Counter>("m", b"[1,2,3]").is_err());
        assert!(codec.decode_message::<Counter>("m", b"\"str\"").is_err());
        assert!(codec.decode_message::<Counter>("m", b"null").is_err());
        assert!(codec.decode_message::<Counter>("m", b"not json").is_err());
    }

    #[test]
    fn test_trailer_encode_shape() {
        let mut trailer = TrailerMap::new();
        trailer.set_grpc_status(0);
        trailer.insert("X-Extra", "yes");
        trailer.insert("empty", "");

        let bytes = JsonCodec.encode_trailer(&trailer);
        // Sorted key order, empty values omitted, lowercased names.
        assert_eq!(&bytes[..], b"grpc-status: 0\r\nx-extra: yes");
    }

    #[test]
    fn test_trailer_decode_normalizes() {
        let trailer = JsonCodec
            .decode_trailer(b"Grpc-Status:  13 \r\nGRPC-MESSAGE: boom\r\n")
            .unwrap();
        assert_eq!(trailer.grpc_status(), Some(13));
        assert_eq!(trailer.grpc_message(), Some("boom"));
    }

    #[test]
    fn test_trailer_round_trip() {
        let mut trailer = TrailerMap::new();
        trailer.set_grpc_status(5);
        trailer.insert("grpc-message", "not%20found");
        trailer.insert("x-late-header", "v");

        let codec = JsonCodec;
        let back = codec.decode_trailer(&codec.encode_trailer(&trailer)).unwrap();
        assert_eq!(back, trailer);
    }

    #[test]
    fn test_malformed_trailer_line_is_rejected() {
        assert!(JsonCodec.decode_trailer(b"no-colon-here").is_err());
    }
}
