//! Service schemas and typed method descriptors.
//!
//! A service is declared as a set of methods, each with a kind and a
//! request/response shape. There is no interface-description
//! language: a [`Method`] constant *is* the declaration, and the same
//! constant drives both the typed client call and the server
//! registration, so the two sides cannot drift apart silently.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use webrpckit_core::schema::Method;
//!
//! #[derive(Serialize, Deserialize)]
//! struct IncrementRequest { value: i64 }
//! #[derive(Serialize, Deserialize)]
//! struct IncrementResponse { value: i64 }
//!
//! const INCREMENT: Method<IncrementRequest, IncrementResponse> =
//!     Method::unary("increment");
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;

use thiserror::Error;

/// The two method kinds: exactly-one response versus zero-or-more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One request, exactly one response message.
    Unary,
    /// One request, a stream of zero or more response messages.
    ServerStream,
}

/// A typed method descriptor: name, kind, and phantom shapes.
///
/// The name doubles as the URL path segment, so it must satisfy the
/// lower-camel rule checked by [`is_valid_method_name`]; both the
/// server router and the client verify it.
pub struct Method<Req, Resp> {
    name: &'static str,
    kind: MethodKind,
    _shapes: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Method<Req, Resp> {
    /// Declare a unary method.
    #[must_use]
    pub const fn unary(name: &'static str) -> Self {
        Self {
            name,
            kind: MethodKind::Unary,
            _shapes: PhantomData,
        }
    }

    /// Declare a server-streamed method.
    #[must_use]
    pub const fn server_stream(name: &'static str) -> Self {
        Self {
            name,
            kind: MethodKind::ServerStream,
            _shapes: PhantomData,
        }
    }

    /// The method name, also its URL path segment.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The method kind.
    #[must_use]
    pub const fn kind(&self) -> MethodKind {
        self.kind
    }
}

// Manual impls: derive would bound Req/Resp, which are phantom.
impl<Req, Resp> Clone for Method<Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for Method<Req, Resp> {}

impl<Req, Resp> std::fmt::Debug for Method<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Whether a method name satisfies `^[a-z][A-Za-z0-9]*$`.
#[must_use]
pub fn is_valid_method_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

/// A schema registration failure.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The name violates the lower-camel method-name rule.
    #[error("invalid method name '{name}': must match ^[a-z][A-Za-z0-9]*$")]
    InvalidMethodName {
        /// The offending name.
        name: String,
    },

    /// The name was registered twice.
    #[error("method '{name}' is already registered")]
    DuplicateMethod {
        /// The offending name.
        name: String,
    },
}

/// The registered method set of one service.
///
/// Built up at server registration time; the router consults it for
/// validation and duplicate detection, and exposes it for
/// introspection.
#[derive(Debug, Clone, Default)]
pub struct ServiceSchema {
    methods: BTreeMap<&'static str, MethodKind>,
}

impl ServiceSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method name with its kind.
    ///
    /// # Errors
    ///
    /// Rejects names violating the method-name rule and duplicates.
    pub fn register(&mut self, name: &'static str, kind: MethodKind) -> Result<(), SchemaError> {
        if !is_valid_method_name(name) {
            return Err(SchemaError::InvalidMethodName {
                name: name.to_owned(),
            });
        }
        if self.methods.insert(name, kind).is_some() {
            return Err(SchemaError::DuplicateMethod {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// The kind of a registered method.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<MethodKind> {
        self.methods.get(name).copied()
    }

    /// Iterate registered methods in name order.
    pub fn methods(&self) -> impl Iterator<Item = (&'static str, MethodKind)> + '_ {
        self.methods.iter().map(|(name, kind)| (*name, *kind))
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name_rule() {
        assert!(is_valid_method_name("increment"));
        assert!(is_valid_method_name("getHello"));
        assert!(is_valid_method_name("streamNumbers2"));
        assert!(is_valid_method_name("a"));

        assert!(!is_valid_method_name(""));
        assert!(!is_valid_method_name("Increment"));
        assert!(!is_valid_method_name("get_hello"));
        assert!(!is_valid_method_name("get-hello"));
        assert!(!is_valid_method_name("1method"));
        assert!(!is_valid_method_name("héllo"));
    }

    #[test]
    fn test_register_rejects_invalid_and_duplicate() {
        let mut schema = ServiceSchema::new();
        schema.register("increment", MethodKind::Unary).unwrap();

        assert!(matches!(
            schema.register("increment", MethodKind::Unary),
            Err(SchemaError::DuplicateMethod { .. })
        ));
        assert!(matches!(
            schema.register("Bad_Name", MethodKind::Unary),
            Err(SchemaError::InvalidMethodName { .. })
        ));
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_method_descriptor_is_const_friendly() {
        const M: Method<(), ()> = Method::server_stream("streamNumbers");
        assert_eq!(M.name(), "streamNumbers");
        assert_eq!(M.kind(), MethodKind::ServerStream);
        let copy = M;
        assert_eq!(copy.name(), M.name());
    }

    #[test]
    fn test_kind_lookup() {
        let mut schema = ServiceSchema::new();
        schema.register("a", MethodKind::Unary).unwrap();
        schema.register("b", MethodKind::ServerStream).unwrap();
        assert_eq!(schema.kind_of("a"), Some(MethodKind::Unary));
        assert_eq!(schema.kind_of("b"), Some(MethodKind::ServerStream));
        assert_eq!(schema.kind_of("c"), None);
    }
}
