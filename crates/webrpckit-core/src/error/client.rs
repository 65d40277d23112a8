//! Errors surfaced to callers of the client engine.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::context::EncodedContext;

use super::kind::RpcKind;

/// An error observed by the caller of an RPC.
///
/// `Rpc` is the lifted form of a wire-level failure: a non-zero
/// `grpc-status`, a mapped HTTP status, or a transport failure.
/// `Protocol` marks responses the peer should never have produced
/// (wrong message count on a unary call, malformed trailers).
/// `RequestContext` wraps a failure of the caller-supplied context
/// connector before the request ever left the process.
///
/// The type is `Clone` because the retry supervisor reports the same
/// error twice, once as a retry observation and once as the terminal
/// event; causes are therefore held behind `Arc`.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ClientError {
    /// The call failed with a classified RPC error.
    #[error("rpc error ({kind}){}", super::message_suffix(.message))]
    #[diagnostic(code(webrpc::client::rpc))]
    Rpc {
        /// Classified failure kind.
        kind: RpcKind,
        /// Human-readable detail, when the peer transmitted one.
        message: Option<String>,
        /// The response context received with the failure, if any.
        /// Trailer-borne context entries are merged in.
        context: Option<EncodedContext>,
    },

    /// The peer violated the gRPC-Web protocol.
    #[error("protocol violation: {message}")]
    #[diagnostic(code(webrpc::client::protocol))]
    Protocol {
        /// What was violated.
        message: String,
    },

    /// The request context connector failed before the call started.
    #[error("request context provider failed: {cause}")]
    #[diagnostic(code(webrpc::client::request_context))]
    RequestContext {
        /// The connector's error.
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl ClientError {
    /// Create an RPC error with just a kind.
    #[must_use]
    pub fn rpc(kind: RpcKind) -> Self {
        Self::Rpc {
            kind,
            message: None,
            context: None,
        }
    }

    /// Create an RPC error with a kind and a message.
    #[must_use]
    pub fn rpc_with_message(kind: RpcKind, message: impl Into<String>) -> Self {
        Self::Rpc {
            kind,
            message: Some(message.into()),
            context: None,
        }
    }

    /// Create a protocol-violation error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Wrap a request-context connector failure.
    #[must_use]
    pub fn request_context<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::RequestContext {
            cause: Arc::new(cause),
        }
    }

    /// Attach a response context to an `Rpc` error. No-op for the
    /// other variants, which have no wire context by construction.
    #[must_use]
    pub fn with_response_context(mut self, ctx: EncodedContext) -> Self {
        if let Self::Rpc { context, .. } = &mut self {
            *context = Some(ctx);
        }
        self
    }

    /// The failure kind this error is classified as.
    ///
    /// Protocol violations classify as `Internal`, connector failures
    /// as `Unknown`; both are non-retryable regardless.
    #[must_use]
    pub fn kind(&self) -> RpcKind {
        match self {
            Self::Rpc { kind, .. } => *kind,
            Self::Protocol { .. } => RpcKind::Internal,
            Self::RequestContext { .. } => RpcKind::Unknown,
        }
    }

    /// The response context received with the failure, if any.
    #[must_use]
    pub fn response_context(&self) -> Option<&EncodedContext> {
        match self {
            Self::Rpc { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    /// The human-readable detail transmitted with the failure, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Rpc { message, .. } => message.as_deref(),
            Self::Protocol { message } => Some(message),
            Self::RequestContext { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = ClientError::rpc_with_message(RpcKind::NotFound, "no such thing");
        assert_eq!(err.to_string(), "rpc error (notFound): no such thing");

        let err = ClientError::rpc(RpcKind::Unavailable);
        assert_eq!(err.to_string(), "rpc error (unavailable)");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            ClientError::protocol("bad trailer").kind(),
            RpcKind::Internal
        );
        assert_eq!(
            ClientError::rpc(RpcKind::Canceled).kind(),
            RpcKind::Canceled
        );
    }

    #[test]
    fn test_context_only_attaches_to_rpc() {
        let mut ctx = EncodedContext::new();
        ctx.insert("x-request-id", "abc");

        let err = ClientError::rpc(RpcKind::Internal).with_response_context(ctx.clone());
        assert_eq!(err.response_context(), Some(&ctx));

        let err = ClientError::protocol("oops").with_response_context(ctx);
        assert!(err.response_context().is_none());
    }

    #[test]
    fn test_clone_preserves_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = ClientError::request_context(io);
        let cloned = err.clone();
        assert!(cloned.to_string().contains("boom"));
    }
}
