//! Router builder mounting one POST route per registered method.

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::{post, MethodRouter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use webrpckit_core::codec::{Codec, JsonCodec};
use webrpckit_core::context::{HeaderContext, ServerContextConnector};
use webrpckit_core::error::ServerError;
use webrpckit_core::schema::{Method, MethodKind, ServiceSchema};

use crate::handler::{serve_stream, serve_unary, ServerConfig};
use crate::report::{ErrorReporter, ErrorSite};
use crate::responder::StreamResponder;

/// Default request body limit: 100 KiB.
pub const DEFAULT_REQUEST_LIMIT: usize = 100 * 1024;

type RouteBuilder<C, X> = Box<dyn FnOnce(Arc<ServerConfig<C, X>>) -> MethodRouter + Send>;

/// Builder for a gRPC-Web service router.
///
/// Every registered method is mounted at `/<method>` as a POST route
/// on the resulting `axum::Router`; other HTTP methods get a 405 from
/// the routing layer.
///
/// # Example
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
/// use webrpckit_core::schema::Method;
/// use webrpckit_server::RpcRouter;
///
/// #[derive(Deserialize)]
/// struct IncrementRequest { value: i64 }
/// #[derive(Serialize)]
/// struct IncrementResponse { value: i64 }
///
/// const INCREMENT: Method<IncrementRequest, IncrementResponse> =
///     Method::unary("increment");
///
/// let router = RpcRouter::new()
///     .unary(INCREMENT, |req: IncrementRequest, _ctx| async move {
///         Ok(IncrementResponse { value: req.value + 1 })
///     })
///     .into_router();
/// # let _ = router;
/// ```
///
/// # Panics
///
/// Registration panics on an invalid or duplicate method name, the
/// same way axum route registration does.
pub struct RpcRouter<C: Codec = JsonCodec, X: ServerContextConnector = HeaderContext> {
    codec: C,
    connector: X,
    request_limit: usize,
    report_error: Option<ErrorReporter>,
    schema: ServiceSchema,
    routes: Vec<(&'static str, RouteBuilder<C, X>)>,
    enable_tracing: bool,
    enable_cors: bool,
}

impl RpcRouter {
    /// Create a router with the JSON codec and the pass-through
    /// context connector.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(JsonCodec, HeaderContext)
    }
}

impl Default for RpcRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec, X: ServerContextConnector> RpcRouter<C, X> {
    /// Create a router with an explicit codec and context connector.
    #[must_use]
    pub fn with_parts(codec: C, connector: X) -> Self {
        Self {
            codec,
            connector,
            request_limit: DEFAULT_REQUEST_LIMIT,
            report_error: None,
            schema: ServiceSchema::new(),
            routes: Vec::new(),
            enable_tracing: false,
            enable_cors: false,
        }
    }

    /// Set the request body limit in bytes. Requests above it fail
    /// with `invalidArgument` and the message "Request Too Large".
    #[must_use]
    pub fn request_limit(mut self, bytes: usize) -> Self {
        self.request_limit = bytes;
        self
    }

    /// Install a sink observing every captured failure. Invoked
    /// under a panic guard; a panicking sink is logged, never
    /// escalated.
    #[must_use]
    pub fn report_error<F>(mut self, sink: F) -> Self
    where
        F: Fn(&ServerError, ErrorSite<'_>) + Send + Sync + 'static,
    {
        self.report_error = Some(Arc::new(sink));
        self
    }

    /// Layer `tower_http::trace::TraceLayer` over the router.
    #[must_use]
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    /// Layer a permissive CORS configuration over the router, which
    /// browser-hosted gRPC-Web clients need. Use your own
    /// `CorsLayer` on the built router for anything stricter.
    #[must_use]
    pub fn with_cors(mut self) -> Self {
        self.enable_cors = true;
        self
    }

    /// Register a unary method.
    #[must_use]
    pub fn unary<Req, Resp, H, Fut>(mut self, method: Method<Req, Resp>, handler: H) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        H: Fn(Req, X::Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, ServerError>> + Send + 'static,
    {
        assert_eq!(
            method.kind(),
            MethodKind::Unary,
            "method '{}' is declared as a server stream",
            method.name()
        );
        self.register(method.name(), MethodKind::Unary);
        let name = method.name();
        self.routes.push((
            name,
            Box::new(move |config: Arc<ServerConfig<C, X>>| {
                post(move |request: Request| {
                    let config = Arc::clone(&config);
                    let handler = handler.clone();
                    async move { serve_unary(config, name, handler, request).await }
                })
            }),
        ));
        self
    }

    /// Register a server-streamed method. The handler drives its
    /// response through the [`StreamResponder`] callbacks.
    #[must_use]
    pub fn server_stream<Req, Resp, H, Fut>(
        mut self,
        method: Method<Req, Resp>,
        handler: H,
    ) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        H: Fn(Req, StreamResponder<Resp>, X::Request) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
    {
        assert_eq!(
            method.kind(),
            MethodKind::ServerStream,
            "method '{}' is declared as unary",
            method.name()
        );
        self.register(method.name(), MethodKind::ServerStream);
        let name = method.name();
        self.routes.push((
            name,
            Box::new(move |config: Arc<ServerConfig<C, X>>| {
                post(move |request: Request| {
                    let config = Arc::clone(&config);
                    let handler = handler.clone();
                    async move { serve_stream(config, name, handler, request).await }
                })
            }),
        ));
        self
    }

    /// The methods registered so far.
    #[must_use]
    pub fn schema(&self) -> &ServiceSchema {
        &self.schema
    }

    /// Build the `axum::Router`.
    #[must_use]
    pub fn into_router(self) -> axum::Router {
        let config = Arc::new(ServerConfig {
            codec: self.codec,
            connector: self.connector,
            request_limit: self.request_limit,
            report_error: self.report_error,
        });

        let mut router = axum::Router::new();
        for (name, build) in self.routes {
            router = router.route(&format!("/{name}"), build(Arc::clone(&config)));
        }
        if self.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }
        if self.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }
        router
    }

    fn register(&mut self, name: &'static str, kind: MethodKind) {
        if let Err(e) = self.schema.register(name, kind) {
            panic!("{e}");
        }
    }
}
