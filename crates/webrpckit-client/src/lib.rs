//! # webrpckit-client
//!
//! The gRPC-Web client engine.
//!
//! A [`Client`] is bound to one remote address and drives typed calls
//! over HTTP/1.1: unary calls resolve to a single value, server
//! streams surface as the event-driven `RpcStream` handle from
//! `webrpckit-core`. The [`retry`] module adds a supervisor that
//! transparently re-opens failed streams with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use webrpckit_client::Client;
//! use webrpckit_core::schema::Method;
//! use webrpckit_core::stream::StreamEvent;
//!
//! #[derive(Serialize)]
//! struct StreamRequest { max: u32 }
//! #[derive(Deserialize)]
//! struct Tick { counter: u32 }
//!
//! const STREAM_NUMBERS: Method<StreamRequest, Tick> =
//!     Method::server_stream("streamNumbers");
//!
//! # async fn example() -> Result<(), webrpckit_core::error::ClientError> {
//! let client = Client::new("http://localhost:8080")?;
//! let mut stream = client.server_stream(STREAM_NUMBERS, StreamRequest { max: 10 });
//! stream.start();
//! while let Some(event) = stream.next().await {
//!     match event {
//!         StreamEvent::Message(msg) => println!("tick {}", msg.value.counter),
//!         StreamEvent::Complete => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]

mod builder;
mod call;
mod client;
pub mod retry;

pub use builder::{ClientBuilder, DEFAULT_USER_AGENT};
pub use call::StreamMessage;
pub use client::Client;
pub use retry::{
    default_is_retryable, retry_stream, ExponentialBackoff, RetryEvent, RetryOptions,
    RetryingStream,
};
