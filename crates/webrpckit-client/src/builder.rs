//! Client construction.

use webrpckit_core::codec::{Codec, JsonCodec};
use webrpckit_core::context::{ClientContextConnector, HeaderContext};
use webrpckit_core::error::ClientError;

use crate::client::Client;

/// Default `user-agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("webrpckit/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// # Example
///
/// ```no_run
/// use webrpckit_client::ClientBuilder;
///
/// # fn main() -> Result<(), webrpckit_core::error::ClientError> {
/// let client = ClientBuilder::new("http://localhost:8080")
///     .user_agent("my-app/1.0")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder<C = JsonCodec, X = HeaderContext> {
    remote_address: String,
    codec: C,
    connector: X,
    user_agent: String,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// Start building a client for the given remote address
    /// (scheme + authority, no trailing slash required).
    #[must_use]
    pub fn new(remote_address: impl Into<String>) -> Self {
        Self {
            remote_address: remote_address.into(),
            codec: JsonCodec,
            connector: HeaderContext,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http: None,
        }
    }
}

impl<C: Codec, X: ClientContextConnector> ClientBuilder<C, X> {
    /// Replace the codec. Changes the negotiated content type.
    #[must_use]
    pub fn codec<C2: Codec>(self, codec: C2) -> ClientBuilder<C2, X> {
        ClientBuilder {
            remote_address: self.remote_address,
            codec,
            connector: self.connector,
            user_agent: self.user_agent,
            http: self.http,
        }
    }

    /// Replace the context connector.
    #[must_use]
    pub fn connector<X2: ClientContextConnector>(self, connector: X2) -> ClientBuilder<C, X2> {
        ClientBuilder {
            remote_address: self.remote_address,
            codec: self.codec,
            connector,
            user_agent: self.user_agent,
            http: self.http,
        }
    }

    /// Override the `user-agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reuse an existing `reqwest::Client` instead of building one.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn build(self) -> Result<Client<C, X>, ClientError> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder().build().map_err(|e| {
                ClientError::protocol(format!("failed to build HTTP client: {e}"))
            })?,
        };
        Ok(Client::from_parts(
            http,
            self.remote_address,
            self.codec,
            self.connector,
            self.user_agent,
        ))
    }
}
