//! The typed client handle.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use webrpckit_core::codec::{Codec, JsonCodec};
use webrpckit_core::context::{ClientContextConnector, HeaderContext};
use webrpckit_core::error::ClientError;
use webrpckit_core::schema::{is_valid_method_name, Method, MethodKind};
use webrpckit_core::stream::RpcStream;

use crate::call::{run_call, CallShared, StreamMessage};

/// A gRPC-Web client bound to one remote address.
///
/// Calls are made against typed [`Method`] descriptors; the same
/// engine drives unary calls and server streams. Cloning is cheap and
/// clones share the underlying HTTP connection pool.
///
/// # Example
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
/// use webrpckit_client::Client;
/// use webrpckit_core::schema::Method;
///
/// #[derive(Serialize)]
/// struct IncrementRequest { value: i64 }
/// #[derive(Deserialize)]
/// struct IncrementResponse { value: i64 }
///
/// const INCREMENT: Method<IncrementRequest, IncrementResponse> =
///     Method::unary("increment");
///
/// # async fn example() -> Result<(), webrpckit_core::error::ClientError> {
/// let client = Client::new("http://localhost:8080")?;
/// let response = client.unary(INCREMENT, IncrementRequest { value: 10 }).await?;
/// assert_eq!(response.value, 11);
/// # Ok(())
/// # }
/// ```
pub struct Client<C: Codec = JsonCodec, X: ClientContextConnector = HeaderContext> {
    shared: Arc<CallShared<C, X>>,
}

impl<C: Codec, X: ClientContextConnector> Clone for Client<C, X> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Client {
    /// Create a client with the default JSON codec and pass-through
    /// context connector.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(remote_address: impl Into<String>) -> Result<Self, ClientError> {
        crate::builder::ClientBuilder::new(remote_address).build()
    }
}

impl<C: Codec, X: ClientContextConnector> Client<C, X> {
    pub(crate) fn from_parts(
        http: reqwest::Client,
        remote_address: String,
        codec: C,
        connector: X,
        user_agent: String,
    ) -> Self {
        Self {
            shared: Arc::new(CallShared {
                http,
                remote_address,
                codec,
                connector,
                user_agent,
            }),
        }
    }

    /// The remote address this client targets.
    #[must_use]
    pub fn remote_address(&self) -> &str {
        &self.shared.remote_address
    }

    /// Build the raw stream for a call without starting it.
    ///
    /// Most callers want [`unary`](Self::unary) or
    /// [`server_stream`](Self::server_stream); this is the shared
    /// constructor underneath both, useful with the retry supervisor
    /// or custom adapters.
    pub fn call<Req, Resp>(
        &self,
        method: Method<Req, Resp>,
        request: Req,
    ) -> RpcStream<StreamMessage<Resp, X::Response>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        if !is_valid_method_name(method.name()) {
            return RpcStream::failed(ClientError::protocol(format!(
                "invalid method name '{}'",
                method.name()
            )));
        }
        let shared = Arc::clone(&self.shared);
        RpcStream::new(move |sink| run_call(shared, method, request, sink))
    }

    /// Invoke a unary method and await its single response.
    ///
    /// # Errors
    ///
    /// Any failure of the call: wire errors, protocol violations
    /// (including a response message count other than one), context
    /// connector failures, cancellation.
    pub async fn unary<Req, Resp>(
        &self,
        method: Method<Req, Resp>,
        request: Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        debug_assert_eq!(method.kind(), MethodKind::Unary);
        let message = self.call(method, request).unary().await?;
        Ok(message.value)
    }

    /// Open a server stream. The returned stream is dormant until
    /// started.
    pub fn server_stream<Req, Resp>(
        &self,
        method: Method<Req, Resp>,
        request: Req,
    ) -> RpcStream<StreamMessage<Resp, X::Response>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        debug_assert_eq!(method.kind(), MethodKind::ServerStream);
        self.call(method, request)
    }
}

impl<C: Codec, X: ClientContextConnector> std::fmt::Debug for Client<C, X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("remote_address", &self.shared.remote_address)
            .field("content_type", &self.shared.codec.content_type())
            .finish()
    }
}
