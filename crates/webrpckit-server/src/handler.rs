//! The request pipeline: one HTTP exchange driven through content
//! negotiation, decode, handler dispatch, and framed response
//! serialization.
//!
//! Errors are serialized in one of two shapes depending on whether
//! response headers have been flushed: before headers the HTTP status
//! carries the mapped kind and `grpc-status`/`grpc-message` ride as
//! headers with an empty body; after headers (the streaming case) the
//! body ends with a trailer frame carrying the same metadata.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use webrpckit_core::codec::{Codec, TrailerMap, GRPC_MESSAGE, GRPC_STATUS};
use webrpckit_core::context::{
    decode_header_value, encode_header_value, EncodedContext, ServerContextConnector,
};
use webrpckit_core::error::{RpcKind, ServerError, ServerRpcError};
use webrpckit_core::frame::{encode_frame, FrameKind};

use crate::report::{report, ErrorReporter};
use crate::responder::{DisconnectGuard, ResponderChannels, ResponderInner, StreamResponder};

/// Shared per-router configuration captured by every route.
pub(crate) struct ServerConfig<C, X> {
    pub(crate) codec: C,
    pub(crate) connector: X,
    pub(crate) request_limit: usize,
    pub(crate) report_error: Option<ErrorReporter>,
}

type Joined = Result<Result<(), ServerError>, JoinError>;

/// Serve one unary call.
pub(crate) async fn serve_unary<C, X, Req, Resp, H, Fut>(
    config: Arc<ServerConfig<C, X>>,
    method: &'static str,
    handler: H,
    request: Request,
) -> Response
where
    C: Codec,
    X: ServerContextConnector,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    H: Fn(Req, X::Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, ServerError>> + Send + 'static,
{
    let path = format!("/{method}");
    let (request_value, ctx) = match accept_call::<C, X, Req>(&config, method, request).await {
        Ok(parts) => parts,
        Err(Rejection::NotAcceptable) => return not_acceptable(),
        Err(Rejection::Call(error)) => return error_response(&config, &path, error).await,
    };

    match handler(request_value, ctx).await {
        Ok(response) => match unary_success(&config, method, &response).await {
            Ok(response) => response,
            Err(error) => error_response(&config, &path, error).await,
        },
        Err(error) => error_response(&config, &path, error).await,
    }
}

/// Serve one server-streamed call.
pub(crate) async fn serve_stream<C, X, Req, Resp, H, Fut>(
    config: Arc<ServerConfig<C, X>>,
    method: &'static str,
    handler: H,
    request: Request,
) -> Response
where
    C: Codec,
    X: ServerContextConnector,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    H: Fn(Req, StreamResponder<Resp>, X::Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
{
    let path = format!("/{method}");
    let (request_value, ctx) = match accept_call::<C, X, Req>(&config, method, request).await {
        Ok(parts) => parts,
        Err(Rejection::NotAcceptable) => return not_acceptable(),
        Err(Rejection::Call(error)) => return error_response(&config, &path, error).await,
    };

    let codec = config.codec.clone();
    let (responder, channels) =
        StreamResponder::new(move |message: &Resp| codec.encode_message(method, message));
    let ResponderChannels {
        inner,
        frames,
        ready,
    } = channels;

    let mut task = tokio::spawn(handler(request_value, responder, ctx));

    // Wait for whichever happens first: the handler declares the
    // stream ready, or it settles without ever doing so.
    let mut settled: Option<Joined> = None;
    let ready_called = tokio::select! {
        result = ready => result.is_ok(),
        joined = &mut task => {
            let ready = inner.ready_was_called();
            settled = Some(joined);
            ready
        }
    };

    if !ready_called {
        // Headers were never flushed; the whole outcome fits in them.
        let joined = match settled {
            Some(joined) => joined,
            None => task.await,
        };
        inner.finish();
        return match finalize_outcome(joined, &inner) {
            Ok(()) => empty_stream_success(&config, &path).await,
            Err(error) => error_response(&config, &path, error).await,
        };
    }

    let response_context = match config.connector.provide_response_context(None).await {
        Ok(ctx) => ctx,
        Err(e) => {
            // Headers not flushed yet, so this still fits the header
            // error shape; the handler's sends will fail from here.
            inner.mark_closed();
            return error_response(&config, &path, ServerError::context(e)).await;
        }
    };

    debug!(method, "stream ready, flushing headers");
    let builder = apply_context_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, config.codec.content_type()),
        &response_context,
    );
    let body = Body::from_stream(stream_body(config, path, settled, task, inner, frames));
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(method, error = %e, "failed to assemble stream response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The streamed response body: handler frames as they come, then one
/// trailer chosen by the handler's outcome. The guard flips the
/// responder's closed flag if the client disconnects and the body is
/// dropped mid-flight.
fn stream_body<C, X>(
    config: Arc<ServerConfig<C, X>>,
    path: String,
    settled: Option<Joined>,
    mut task: JoinHandle<Result<(), ServerError>>,
    inner: Arc<ResponderInner>,
    mut frames: tokio::sync::mpsc::UnboundedReceiver<Bytes>,
) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    C: Codec,
    X: ServerContextConnector,
{
    async_stream::stream! {
        let _guard = DisconnectGuard(Arc::clone(&inner));

        enum Step {
            Frame(Bytes),
            FramesClosed,
            Settled(Joined),
        }

        let joined = match settled {
            Some(joined) => joined,
            None => {
                let joined;
                loop {
                    let step = tokio::select! {
                        result = &mut task => Step::Settled(result),
                        frame = frames.recv() => match frame {
                            Some(frame) => Step::Frame(frame),
                            None => Step::FramesClosed,
                        },
                    };
                    match step {
                        Step::Frame(frame) => yield Ok(frame),
                        Step::FramesClosed => {
                            joined = task.await;
                            break;
                        }
                        Step::Settled(result) => {
                            joined = result;
                            break;
                        }
                    }
                }
                joined
            }
        };

        // Late sends from a leaked responder fail instead of racing
        // the trailer.
        inner.finish();

        // Flush frames that were queued before the handler settled.
        while let Ok(frame) = frames.try_recv() {
            yield Ok(frame);
        }

        let trailer = match finalize_outcome(joined, &inner) {
            Ok(()) => success_trailer(&config.codec),
            Err(error) => {
                report(config.report_error.as_ref(), &error, &path);
                error_trailer(&config, &path, &error).await
            }
        };
        yield Ok(trailer);
    }
}

enum Rejection {
    NotAcceptable,
    Call(ServerError),
}

/// The shared request prelude: content negotiation, limited body
/// read, context decode, request decode.
async fn accept_call<C, X, Req>(
    config: &ServerConfig<C, X>,
    method: &'static str,
    request: Request,
) -> Result<(Req, X::Request), Rejection>
where
    C: Codec,
    X: ServerContextConnector,
    Req: DeserializeOwned,
{
    let (parts, body) = request.into_parts();

    let accept = parts.headers.get(ACCEPT).and_then(|v| v.to_str().ok());
    if accept != Some(config.codec.content_type()) {
        debug!(method, ?accept, "rejecting mismatched accept header");
        return Err(Rejection::NotAcceptable);
    }

    let body = read_body_limited(body, config.request_limit)
        .await
        .map_err(Rejection::Call)?;

    let encoded = context_from_headers(&parts.headers);
    let ctx = config
        .connector
        .decode_request_context(&encoded)
        .await
        .map_err(|e| Rejection::Call(ServerError::context(e)))?;

    let request_value = config
        .codec
        .decode_request(method, &body)
        .map_err(|e| Rejection::Call(ServerError::transport(e.to_string())))?;

    Ok((request_value, ctx))
}

/// Read the whole request body, failing with the transmitted
/// "Request Too Large" error as soon as the limit is crossed.
async fn read_body_limited(body: Body, limit: usize) -> Result<Vec<u8>, ServerError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ServerError::transport(format!("failed to read request body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(ServerRpcError::new(RpcKind::InvalidArgument)
                .with_transmitted_message("Request Too Large")
                .into());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Build the encoded request context: lowercased names,
/// percent-decoded values. Non-UTF-8 header values are skipped.
fn context_from_headers(headers: &HeaderMap) -> EncodedContext {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), decode_header_value(value)))
        })
        .collect()
}

async fn unary_success<C, X, Resp>(
    config: &ServerConfig<C, X>,
    method: &'static str,
    response: &Resp,
) -> Result<Response, ServerError>
where
    C: Codec,
    X: ServerContextConnector,
    Resp: Serialize,
{
    let payload = config
        .codec
        .encode_message(method, response)
        .map_err(|e| ServerError::transport(e.to_string()))?;
    let response_context = config
        .connector
        .provide_response_context(None)
        .await
        .map_err(ServerError::context)?;

    let mut body = Vec::new();
    body.extend_from_slice(&encode_frame(FrameKind::Message, &payload));
    body.extend_from_slice(&success_trailer(&config.codec));

    let builder = apply_context_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, config.codec.content_type()),
        &response_context,
    );
    builder
        .body(Body::from(body))
        .map_err(|e| ServerError::transport(format!("failed to assemble response: {e}")))
}

/// The empty-stream success shape: a handler that settles without
/// ever calling `ready()` gets a 200 with a lone success trailer.
async fn empty_stream_success<C, X>(config: &ServerConfig<C, X>, path: &str) -> Response
where
    C: Codec,
    X: ServerContextConnector,
{
    let response_context = match config.connector.provide_response_context(None).await {
        Ok(ctx) => ctx,
        Err(e) => return error_response(config, path, ServerError::context(e)).await,
    };
    let builder = apply_context_headers(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, config.codec.content_type()),
        &response_context,
    );
    match builder.body(Body::from(success_trailer(&config.codec))) {
        Ok(response) => response,
        Err(e) => {
            warn!(%path, error = %e, "failed to assemble response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serialize an error when response headers have not been sent: HTTP
/// status from the kind, `grpc-status`/`grpc-message` as headers,
/// empty body.
pub(crate) async fn error_response<C, X>(
    config: &ServerConfig<C, X>,
    path: &str,
    error: ServerError,
) -> Response
where
    C: Codec,
    X: ServerContextConnector,
{
    report(config.report_error.as_ref(), &error, path);

    let response_context = match config.connector.provide_response_context(Some(&error)).await {
        Ok(ctx) => ctx,
        Err(e) => {
            // Secondary failure during error serialization: reported,
            // never escalated.
            report(config.report_error.as_ref(), &ServerError::context(e), path);
            EncodedContext::new()
        }
    };

    let kind = error.kind();
    let mut builder = Response::builder()
        .status(kind.http_status())
        .header(CONTENT_TYPE, config.codec.content_type())
        .header(GRPC_STATUS, kind.grpc_status().to_string());
    if let Some(message) = error.wire_message() {
        builder = builder.header(GRPC_MESSAGE, encode_header_value(message));
    }
    builder = apply_context_headers(builder, &response_context);

    match builder.body(Body::empty()) {
        Ok(response) => response,
        Err(e) => {
            report(
                config.report_error.as_ref(),
                &ServerError::transport(format!("failed to assemble error response: {e}")),
                path,
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn not_acceptable() -> Response {
    StatusCode::NOT_ACCEPTABLE.into_response()
}

fn success_trailer<C: Codec>(codec: &C) -> Bytes {
    let mut trailer = TrailerMap::new();
    trailer.set_grpc_status(0);
    encode_frame(FrameKind::Trailer, &codec.encode_trailer(&trailer))
}

/// The trailer-borne error shape used once headers are out: non-zero
/// `grpc-status`, percent-encoded `grpc-message`, and any context
/// entries the connector wants to ride in trailers.
async fn error_trailer<C, X>(
    config: &ServerConfig<C, X>,
    path: &str,
    error: &ServerError,
) -> Bytes
where
    C: Codec,
    X: ServerContextConnector,
{
    let mut trailer = TrailerMap::new();
    trailer.set_grpc_status(error.kind().grpc_status());
    if let Some(message) = error.wire_message() {
        trailer.insert(GRPC_MESSAGE, encode_header_value(message));
    }
    match config.connector.provide_response_context(Some(error)).await {
        Ok(ctx) => {
            for (name, value) in ctx.iter() {
                if name != GRPC_STATUS && name != GRPC_MESSAGE {
                    trailer.insert(name, encode_header_value(value));
                }
            }
        }
        Err(e) => report(config.report_error.as_ref(), &ServerError::context(e), path),
    }
    encode_frame(FrameKind::Trailer, &config.codec.encode_trailer(&trailer))
}

/// Fold the join result and any recorded responder violation into
/// the call's final outcome.
fn finalize_outcome(joined: Joined, inner: &ResponderInner) -> Result<(), ServerError> {
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(join_error) => Err(ServerError::handler_protocol(format!(
            "handler panicked: {join_error}"
        ))),
    };
    match (outcome, inner.take_violation()) {
        (Err(error), _) => Err(error),
        (Ok(()), Some(violation)) => Err(ServerError::handler_protocol(violation)),
        (Ok(()), None) => Ok(()),
    }
}

/// Write context entries as response headers, percent-encoding the
/// values. Entries whose names are not valid header names are
/// dropped with a warning rather than failing the response.
fn apply_context_headers(mut builder: Builder, context: &EncodedContext) -> Builder {
    for (name, value) in context.iter() {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(name, "dropping response context entry with invalid header name");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(&encode_header_value(value)) else {
            warn!(%name, "dropping response context entry with invalid value");
            continue;
        };
        builder = builder.header(name, value);
    }
    builder
}
