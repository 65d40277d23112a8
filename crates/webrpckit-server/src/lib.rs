//! # webrpckit-server
//!
//! The gRPC-Web server engine.
//!
//! [`RpcRouter`] compiles a service schema plus handlers into an
//! `axum::Router`: one POST route per method, strict content
//! negotiation, limited body reads, context connector plumbing, and
//! the gRPC-Web response shapes (framed messages with a trailer in
//! the body, status-in-headers for failures before the body starts,
//! status-in-trailers after).
//!
//! Unary handlers are plain async functions from request to
//! response. Stream handlers receive a [`StreamResponder`] and drive
//! the `not ready → ready → end` callback protocol; the engine turns
//! their frames into a streamed HTTP body and appends the trailer
//! when the handler settles.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use webrpckit_core::schema::Method;
//! use webrpckit_server::RpcRouter;
//!
//! #[derive(Deserialize)]
//! struct StreamRequest { max: u32 }
//! #[derive(Serialize)]
//! struct Tick { counter: u32 }
//!
//! const STREAM_NUMBERS: Method<StreamRequest, Tick> =
//!     Method::server_stream("streamNumbers");
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = RpcRouter::new()
//!     .server_stream(STREAM_NUMBERS, |req: StreamRequest, responder, _ctx| async move {
//!         responder.ready()?;
//!         for counter in 0..req.max {
//!             responder.send(&Tick { counter })?;
//!         }
//!         Ok(())
//!     })
//!     .into_router();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]

mod handler;
mod report;
mod responder;
mod router;

pub use report::{ErrorReporter, ErrorSite};
pub use responder::StreamResponder;
pub use router::{RpcRouter, DEFAULT_REQUEST_LIMIT};
