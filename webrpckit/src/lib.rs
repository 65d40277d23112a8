//! # webrpckit
//!
//! A gRPC-Web RPC framework over plain HTTP/1.1.
//!
//! Services are declared as typed schemas (no interface-description
//! language) and compiled into client handles and server routers:
//!
//! - **Unary and server-streamed calls** over the gRPC-Web wire
//!   protocol (5-byte frames, trailer-in-body, status-in-trailers)
//! - **Pluggable codecs**, JSON by default
//!   (`application/grpc-web+json`)
//! - **Event-driven streams** with a strict lifecycle:
//!   `ready → message* → (complete | canceled | error)`
//! - **Retry supervision** with exponential backoff and observable
//!   retry events
//! - **Context connectors** carrying call metadata through HTTP
//!   headers in both directions
//!
//! ## Quick start
//!
//! ```no_run
//! use webrpckit::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct IncrementRequest { value: i64 }
//! #[derive(Serialize, Deserialize)]
//! struct IncrementResponse { value: i64 }
//!
//! const INCREMENT: Method<IncrementRequest, IncrementResponse> =
//!     Method::unary("increment");
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     use std::future::IntoFuture;
//!
//!     let router = RpcRouter::new()
//!         .unary(INCREMENT, |req: IncrementRequest, _ctx| async move {
//!             Ok(IncrementResponse { value: req.value + 1 })
//!         })
//!         .into_router();
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     tokio::spawn(axum::serve(listener, router).into_future());
//!
//!     let client = Client::new("http://127.0.0.1:8080")?;
//!     let response = client.unary(INCREMENT, IncrementRequest { value: 10 }).await?;
//!     assert_eq!(response.value, 11);
//!     Ok(())
//! }
//! ```
//!
//! ## Crate organization
//!
//! - [`webrpckit_core`] - frames, codecs, streams, errors, schemas
//! - [`webrpckit_client`] - the client engine and retry supervisor
//! - [`webrpckit_server`] - the axum-based server engine

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]

// Re-export all public items from core
pub use webrpckit_core::*;

// Re-export the engine entry points
pub use webrpckit_client::{
    retry_stream, Client, ClientBuilder, ExponentialBackoff, RetryEvent, RetryOptions,
    RetryingStream, StreamMessage,
};
pub use webrpckit_server::{ErrorSite, RpcRouter, StreamResponder};

pub mod prelude;

/// Client module re-exports
pub mod client {
    //! Client engine types.
    pub use webrpckit_client::*;
}

/// Server module re-exports
pub mod server {
    //! Server engine types.
    pub use webrpckit_server::*;
}
