//! # webrpckit-core
//!
//! Core types for the webrpckit gRPC-Web framework.
//!
//! This crate holds everything the client and server engines share:
//!
//! - **Error taxonomy**: the closed [`error::RpcKind`] set with its
//!   gRPC-code and HTTP-status tables, plus the client/server error
//!   envelopes
//! - **Frame layer**: 5-byte gRPC-Web framing and the incremental
//!   [`frame::ChunkParser`]
//! - **Codec**: the [`codec::Codec`] interface with the default
//!   [`codec::JsonCodec`] and trailer metadata
//! - **Context**: pluggable request/response metadata connectors over
//!   HTTP headers
//! - **Schema**: typed [`schema::Method`] descriptors, no IDL
//! - **Stream abstraction**: the event-driven [`stream::RpcStream`]
//!   handle underlying unary and server-streamed calls
//!
//! The engines live in `webrpckit-client` and `webrpckit-server`; the
//! `webrpckit` umbrella crate re-exports everything.

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod context;
pub mod error;
pub mod frame;
pub mod schema;
pub mod stream;

// Re-export commonly used types at the crate root
pub use codec::{Codec, CodecError, JsonCodec, TrailerMap, GRPC_MESSAGE, GRPC_STATUS};
pub use context::{
    decode_header_value, encode_header_value, ClientContextConnector, EncodedContext,
    HeaderContext, ServerContextConnector,
};
pub use error::{ClientError, RpcKind, ServerError, ServerRpcError};
pub use frame::{encode_frame, ChunkParser, Frame, FrameKind};
pub use schema::{is_valid_method_name, Method, MethodKind, ServiceSchema};
pub use stream::{EventSink, RpcStream, StreamEvent};

// Re-export bytes types for zero-copy payload handling
pub use bytes::{Bytes, BytesMut};
