//! Prelude module for convenient imports.
//!
//! # Example
//!
//! ```rust
//! use webrpckit::prelude::*;
//! ```

pub use webrpckit_core::codec::{Codec, CodecError, JsonCodec, TrailerMap};
pub use webrpckit_core::context::{
    ClientContextConnector, EncodedContext, HeaderContext, ServerContextConnector,
};
pub use webrpckit_core::error::{ClientError, RpcKind, ServerError, ServerRpcError};
pub use webrpckit_core::schema::{Method, MethodKind, ServiceSchema};
pub use webrpckit_core::stream::{RpcStream, StreamEvent};

pub use webrpckit_client::{
    retry_stream, Client, ClientBuilder, ExponentialBackoff, RetryEvent, RetryOptions,
    RetryingStream, StreamMessage,
};

pub use webrpckit_server::{ErrorSite, RpcRouter, StreamResponder};
