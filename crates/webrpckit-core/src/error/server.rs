//! Errors raised inside the server engine and by handlers.

use miette::Diagnostic;
use thiserror::Error;

use super::kind::RpcKind;

/// Boxed error cause used where the concrete type is irrelevant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An RPC error deliberately raised by a handler.
///
/// The `internal_message` is for operators: it reaches the error
/// report sink and the logs but never the wire. Only the kind and the
/// `transmitted_message` are serialized to the client.
#[derive(Debug, Error, Diagnostic)]
#[error("rpc error ({kind}){}", detail_suffix(.internal_message, .transmitted_message))]
#[diagnostic(code(webrpc::server::rpc))]
pub struct ServerRpcError {
    kind: RpcKind,
    internal_message: Option<String>,
    transmitted_message: Option<String>,
}

/// Display helper: prefer the internal detail, fall back to the
/// transmitted one.
fn detail_suffix(internal: &Option<String>, transmitted: &Option<String>) -> String {
    match internal.as_deref().or(transmitted.as_deref()) {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

impl ServerRpcError {
    /// Create an error of the given kind with no messages.
    #[must_use]
    pub fn new(kind: RpcKind) -> Self {
        Self {
            kind,
            internal_message: None,
            transmitted_message: None,
        }
    }

    /// Attach an operator-facing message. Never sent to the client.
    #[must_use]
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Attach a message that WILL be sent to the client verbatim.
    /// Keep secrets and internals out of it.
    #[must_use]
    pub fn with_transmitted_message(mut self, message: impl Into<String>) -> Self {
        self.transmitted_message = Some(message.into());
        self
    }

    /// The failure kind.
    #[must_use]
    pub fn kind(&self) -> RpcKind {
        self.kind
    }

    /// The operator-facing message, if any.
    #[must_use]
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// The client-facing message, if any.
    #[must_use]
    pub fn transmitted_message(&self) -> Option<&str> {
        self.transmitted_message.as_deref()
    }
}

/// Any failure outcome of serving one call.
///
/// Only the `Rpc` variant carries detail chosen for the wire; every
/// other variant serializes as a bare `internal` status so nothing
/// accidental leaks to clients.
#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    /// A handler-raised, classified RPC error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rpc(#[from] ServerRpcError),

    /// Reading or decoding the request failed.
    #[error("transport error: {message}")]
    #[diagnostic(code(webrpc::server::transport))]
    Transport {
        /// What failed.
        message: String,
    },

    /// A stream handler misused its responder, or encoding an
    /// outgoing message failed.
    #[error("handler protocol violation: {message}")]
    #[diagnostic(code(webrpc::server::handler_protocol))]
    HandlerProtocol {
        /// What was violated.
        message: String,
    },

    /// The server context connector failed.
    #[error("context connector failed: {cause}")]
    #[diagnostic(code(webrpc::server::context))]
    Context {
        /// The connector's error.
        cause: BoxError,
    },
}

impl ServerError {
    /// Create a transport-level error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a handler protocol violation.
    #[must_use]
    pub fn handler_protocol(message: impl Into<String>) -> Self {
        Self::HandlerProtocol {
            message: message.into(),
        }
    }

    /// Wrap a context connector failure.
    #[must_use]
    pub fn context<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Context {
            cause: Box::new(cause),
        }
    }

    /// The kind serialized to the client. Everything that is not a
    /// deliberate `ServerRpcError` collapses to `Internal`.
    #[must_use]
    pub fn kind(&self) -> RpcKind {
        match self {
            Self::Rpc(err) => err.kind(),
            Self::Transport { .. } | Self::HandlerProtocol { .. } | Self::Context { .. } => {
                RpcKind::Internal
            }
        }
    }

    /// The message serialized to the client, if any. Only the
    /// transmitted message of a deliberate RPC error ever crosses the
    /// wire.
    #[must_use]
    pub fn wire_message(&self) -> Option<&str> {
        match self {
            Self::Rpc(err) => err.transmitted_message(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_message_never_reaches_wire() {
        let err: ServerError = ServerRpcError::new(RpcKind::NotFound)
            .with_internal_message("row 42 missing in shard 7")
            .with_transmitted_message("language 'x' not found")
            .into();

        assert_eq!(err.kind(), RpcKind::NotFound);
        assert_eq!(err.wire_message(), Some("language 'x' not found"));
        // The internal detail is still visible to operators.
        assert!(err.to_string().contains("row 42"));
    }

    #[test]
    fn test_non_rpc_errors_collapse_to_internal() {
        assert_eq!(
            ServerError::transport("body decode failed").kind(),
            RpcKind::Internal
        );
        assert_eq!(
            ServerError::handler_protocol("send before ready").kind(),
            RpcKind::Internal
        );
        assert!(ServerError::transport("body decode failed")
            .wire_message()
            .is_none());
    }

    #[test]
    fn test_rpc_error_without_messages() {
        let err = ServerRpcError::new(RpcKind::Unavailable);
        assert_eq!(err.to_string(), "rpc error (unavailable)");
        assert!(err.transmitted_message().is_none());
    }
}
