//! Call context carried via HTTP headers.
//!
//! A context is metadata attached to a call: request context flows
//! client→server, response context server→client. On the wire both
//! are header maps with lowercase names and percent-encoded values;
//! what those headers *mean* is up to a pluggable connector pair.
//!
//! The framework consumes only the small connector interfaces defined
//! here. [`HeaderContext`] is the pass-through default: no request
//! context, response context decoded as the raw header map.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::ServerError;

/// ASCII characters that must be escaped in context header values,
/// per the gRPC-Web metadata convention. Non-ASCII bytes are always
/// escaped.
const HEADER_VALUE_ESCAPES: &AsciiSet = &CONTROLS.add(b'%').add(b' ');

/// Percent-encode a context header value for the wire.
#[must_use]
pub fn encode_header_value(value: &str) -> String {
    utf8_percent_encode(value, HEADER_VALUE_ESCAPES).to_string()
}

/// Decode a percent-encoded context header value. Invalid UTF-8
/// sequences are replaced rather than rejected; header metadata is
/// advisory and must not kill a call.
#[must_use]
pub fn decode_header_value(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// The wire form of a context: header name → single string value.
///
/// Names are case-insensitive and stored lowercased. Iteration order
/// is the sorted name order, which keeps encoded requests and tests
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedContext {
    entries: BTreeMap<String, String>,
}

impl EncodedContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. The name is lowercased; an existing entry
    /// with the same name is replaced.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up an entry by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.entries
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
        } else {
            self.entries.get(name).map(String::as_str)
        }
    }

    /// Merge every entry of `other` into `self`, overwriting
    /// duplicates. Used to fold trailer-borne context entries into
    /// the head-of-line context.
    pub fn merge(&mut self, other: &EncodedContext) {
        for (name, value) in other.iter() {
            self.entries.insert(name.to_owned(), value.to_owned());
        }
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

    /// Whether the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for EncodedContext {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut ctx = Self::new();
        for (name, value) in iter {
            ctx.insert(name, value);
        }
        ctx
    }
}

impl IntoIterator for EncodedContext {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Client side of a context connector pair.
///
/// `provide_request_context` runs before every call; its output is
/// written to the request headers. `decode_response_context` runs on
/// the received response headers; its output rides the stream's
/// `Ready` and `Message` events.
pub trait ClientContextConnector: Send + Sync + 'static {
    /// The decoded response context type.
    type Response: Clone + Send + Sync + 'static;
    /// Connector failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce the request context for one call.
    fn provide_request_context(
        &self,
    ) -> impl Future<Output = Result<EncodedContext, Self::Error>> + Send;

    /// Decode the response context received from the server.
    fn decode_response_context(
        &self,
        encoded: &EncodedContext,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// Server side of a context connector pair.
///
/// `decode_request_context` turns inbound headers into the typed
/// context handed to every handler; a failure there is the method's
/// error outcome. `provide_response_context` produces the headers for
/// the response, and sees the error when the call is failing.
pub trait ServerContextConnector: Send + Sync + 'static {
    /// The decoded request context type handed to handlers.
    type Request: Send + Sync + 'static;
    /// Connector failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Decode the request context from inbound headers.
    fn decode_request_context(
        &self,
        encoded: &EncodedContext,
    ) -> impl Future<Output = Result<Self::Request, Self::Error>> + Send;

    /// Produce the response context, observing the outcome.
    fn provide_response_context(
        &self,
        error: Option<&ServerError>,
    ) -> impl Future<Output = Result<EncodedContext, Self::Error>> + Send;
}

/// Pass-through connector: sends no request context and surfaces the
/// raw header map as the decoded context on both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderContext;

impl ClientContextConnector for HeaderContext {
    type Response = EncodedContext;
    type Error = Infallible;

    async fn provide_request_context(&self) -> Result<EncodedContext, Infallible> {
        Ok(EncodedContext::new())
    }

    async fn decode_response_context(
        &self,
        encoded: &EncodedContext,
    ) -> Result<EncodedContext, Infallible> {
        Ok(encoded.clone())
    }
}

impl ServerContextConnector for HeaderContext {
    type Request = EncodedContext;
    type Error = Infallible;

    async fn decode_request_context(
        &self,
        encoded: &EncodedContext,
    ) -> Result<EncodedContext, Infallible> {
        Ok(encoded.clone())
    }

    async fn provide_response_context(
        &self,
        _error: Option<&ServerError>,
    ) -> Result<EncodedContext, Infallible> {
        Ok(EncodedContext::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_folded() {
        let mut ctx = EncodedContext::new();
        ctx.insert("X-Request-Id", "abc");
        assert_eq!(ctx.get("x-request-id"), Some("abc"));
        assert_eq!(ctx.get("X-REQUEST-ID"), Some("abc"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_insert_replaces() {
        let mut ctx = EncodedContext::new();
        ctx.insert("key", "one");
        ctx.insert("KEY", "two");
        assert_eq!(ctx.get("key"), Some("two"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_merge_overwrites() {
        let mut base = EncodedContext::new();
        base.insert("a", "1");
        base.insert("b", "2");

        let mut extra = EncodedContext::new();
        extra.insert("b", "3");
        extra.insert("c", "4");

        base.merge(&extra);
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("3"));
        assert_eq!(base.get("c"), Some("4"));
    }

    #[test]
    fn test_header_value_round_trip() {
        for value in ["plain", "with space", "ünïcode", "100%", "a\r\nb"] {
            let encoded = encode_header_value(value);
            assert!(encoded.is_ascii());
            assert!(!encoded.contains(' '));
            assert!(!encoded.contains('\r'));
            assert_eq!(decode_header_value(&encoded), value);
        }
    }

    #[tokio::test]
    async fn test_header_context_passes_through() {
        let mut encoded = EncodedContext::new();
        encoded.insert("x-tenant", "acme");

        let connector = HeaderContext;
        let provided = connector.provide_request_context().await.unwrap();
        assert!(provided.is_empty());

        let decoded = connector.decode_response_context(&encoded).await.unwrap();
        assert_eq!(decoded, encoded);
    }
}
