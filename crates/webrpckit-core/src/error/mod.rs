//! Error taxonomy for the framework.
//!
//! Both sides of the wire share one closed set of failure kinds
//! ([`RpcKind`]); what differs is the envelope. The client lifts wire
//! failures into [`ClientError`], which is what every stream terminal
//! `error` event carries. The server works in [`ServerError`], whose
//! serialization rules guarantee that only deliberately transmitted
//! detail ever reaches a client.
//!
//! # Propagation rules
//!
//! - A handler may raise [`ServerRpcError`] to choose the kind and
//!   the client-visible message. Its internal message goes to the
//!   error report sink only.
//! - Every other server-side failure (codec, connector, responder
//!   misuse) is transmitted as a bare `internal`.
//! - Client-side, protocol violations become
//!   [`ClientError::Protocol`]; request-context failures become
//!   [`ClientError::RequestContext`]; everything off the wire becomes
//!   [`ClientError::Rpc`].

mod client;
mod kind;
mod server;

pub use client::ClientError;
pub use kind::{RpcKind, ALL_KINDS};
pub use server::{BoxError, ServerError, ServerRpcError};

/// Display helper: `": detail"` when a message is present.
pub(crate) fn message_suffix(message: &Option<String>) -> String {
    match message.as_deref() {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_is_small_enough() {
        // ClientError rides every stream event channel; keep it lean.
        assert!(std::mem::size_of::<ClientError>() <= 88);
    }

    #[test]
    fn test_kinds_agree_across_sides() {
        let server: ServerError = ServerRpcError::new(RpcKind::PermissionDenied).into();
        let client = ClientError::rpc(RpcKind::from_grpc_status(
            server.kind().grpc_status(),
        ));
        assert_eq!(client.kind(), RpcKind::PermissionDenied);
    }
}
