//! The per-call engine: one HTTP exchange driven into stream events.
//!
//! `run_call` is the stream producer behind every client call. It
//! provides the request context, posts the encoded request, processes
//! the response headers (context decode, gRPC error rejoin, HTTP
//! status mapping), then feeds body chunks through a [`ChunkParser`]
//! until the trailer or the end of the transport. Cancellation drops
//! the in-flight transfer, which aborts it.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use webrpckit_core::codec::{Codec, GRPC_MESSAGE, GRPC_STATUS};
use webrpckit_core::context::{
    decode_header_value, encode_header_value, ClientContextConnector, EncodedContext,
};
use webrpckit_core::error::{ClientError, RpcKind};
use webrpckit_core::frame::{ChunkParser, FrameKind};
use webrpckit_core::schema::Method;
use webrpckit_core::stream::EventSink;

/// One server message together with the decoded response context it
/// arrived under.
#[derive(Debug, Clone)]
pub struct StreamMessage<T, C> {
    /// The decoded message value.
    pub value: T,
    /// The connector-decoded response context of this call.
    pub context: C,
}

/// Everything a call needs from its client, shared across calls.
pub(crate) struct CallShared<C, X> {
    pub(crate) http: reqwest::Client,
    pub(crate) remote_address: String,
    pub(crate) codec: C,
    pub(crate) connector: X,
    pub(crate) user_agent: String,
}

/// Drive one call to its terminal event.
pub(crate) async fn run_call<C, X, Req, Resp>(
    shared: Arc<CallShared<C, X>>,
    method: Method<Req, Resp>,
    request: Req,
    sink: EventSink<StreamMessage<Resp, X::Response>>,
) where
    C: Codec,
    X: ClientContextConnector,
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    let request_context = match shared.connector.provide_request_context().await {
        Ok(ctx) => ctx,
        Err(e) => {
            sink.error(ClientError::request_context(e));
            return;
        }
    };

    let body = match shared.codec.encode_request(method.name(), &request) {
        Ok(body) => body,
        Err(e) => {
            sink.error(ClientError::protocol(e.to_string()));
            return;
        }
    };

    let url = format!(
        "{}/{}",
        shared.remote_address.trim_end_matches('/'),
        method.name()
    );
    debug!(method = method.name(), %url, "starting call");

    let mut builder = shared
        .http
        .post(&url)
        .header(CONTENT_TYPE, shared.codec.content_type())
        .header(ACCEPT, shared.codec.content_type())
        .header(USER_AGENT, shared.user_agent.as_str());
    for (name, value) in request_context.iter() {
        builder = builder.header(name, encode_header_value(value));
    }

    let response = tokio::select! {
        () = sink.cancelled() => return,
        response = builder.body(body).send() => match response {
            Ok(response) => response,
            Err(e) => {
                warn!(method = method.name(), error = %e, "transport failed");
                sink.error(transport_error(&e));
                return;
            }
        },
    };

    let status = response.status().as_u16();
    let encoded_context = context_from_headers(response.headers());

    // The context decode is a suspension point; any body chunks that
    // arrive meanwhile sit unpolled in the transport until the loop
    // below starts, so nothing is lost.
    let decoded_context = tokio::select! {
        () = sink.cancelled() => return,
        decoded = shared.connector.decode_response_context(&encoded_context) => match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                sink.error(ClientError::protocol(format!(
                    "failed to decode response context: {e}"
                )));
                return;
            }
        },
    };

    // A gRPC status in the response headers means the call failed
    // before any body was produced; it wins over the HTTP status,
    // which carries a coarser version of the same fact.
    if let Some(raw) = encoded_context.get(GRPC_STATUS) {
        match raw.parse::<u32>() {
            Ok(0) => {}
            Ok(code) => {
                let message = encoded_context.get(GRPC_MESSAGE).map(str::to_owned);
                sink.error(ClientError::Rpc {
                    kind: RpcKind::from_grpc_status(code),
                    message,
                    context: Some(encoded_context),
                });
                return;
            }
            Err(_) => {
                sink.error(ClientError::protocol(format!(
                    "unparseable grpc-status header {raw:?}"
                )));
                return;
            }
        }
    }

    if status != 200 {
        let kind = RpcKind::from_http_status(status);
        let message = encoded_context
            .get(GRPC_MESSAGE)
            .map(str::to_owned)
            .or_else(|| (status == 413).then(|| "Request Too Large".to_owned()));
        debug!(method = method.name(), status, %kind, "non-200 response");
        sink.error(ClientError::Rpc {
            kind,
            message,
            context: Some(encoded_context),
        });
        return;
    }

    sink.ready();

    let mut parser = ChunkParser::new();
    let mut trailers_received = false;
    let mut chunks = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            () = sink.cancelled() => return,
            chunk = chunks.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for frame in parser.push(&bytes) {
                    match frame.kind {
                        FrameKind::Message => {
                            if trailers_received {
                                sink.error(ClientError::protocol(
                                    "message frame received after trailers",
                                ));
                                return;
                            }
                            match shared.codec.decode_message(method.name(), &frame.payload) {
                                Ok(value) => {
                                    sink.message(StreamMessage {
                                        value,
                                        context: decoded_context.clone(),
                                    });
                                }
                                Err(e) => {
                                    sink.error(ClientError::protocol(e.to_string()));
                                    return;
                                }
                            }
                        }
                        FrameKind::Trailer => {
                            let trailer = match shared.codec.decode_trailer(&frame.payload) {
                                Ok(trailer) => trailer,
                                Err(e) => {
                                    sink.error(ClientError::protocol(e.to_string()));
                                    return;
                                }
                            };
                            match trailer.grpc_status() {
                                Some(0) => trailers_received = true,
                                Some(code) => {
                                    let message =
                                        trailer.grpc_message().map(decode_header_value);
                                    let mut context = encoded_context.clone();
                                    for (name, value) in trailer.iter() {
                                        if name != GRPC_STATUS && name != GRPC_MESSAGE {
                                            context.insert(name, decode_header_value(value));
                                        }
                                    }
                                    sink.error(ClientError::Rpc {
                                        kind: RpcKind::from_grpc_status(code),
                                        message,
                                        context: Some(context),
                                    });
                                    return;
                                }
                                None => {
                                    sink.error(ClientError::protocol(
                                        "trailer frame without a grpc-status entry",
                                    ));
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            Some(Err(e)) => {
                warn!(method = method.name(), error = %e, "transport failed mid-stream");
                sink.error(transport_error(&e));
                return;
            }
            None => {
                if trailers_received {
                    sink.complete();
                } else {
                    sink.error(ClientError::rpc_with_message(
                        RpcKind::Unavailable,
                        "connection closed before trailers",
                    ));
                }
                return;
            }
        }
    }
}

/// Build the encoded response context from received headers:
/// lowercased names, percent-decoded values. Non-UTF-8 header values
/// are skipped rather than failing the call.
fn context_from_headers(headers: &reqwest::header::HeaderMap) -> EncodedContext {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_owned(), decode_header_value(value)))
        })
        .collect()
}

fn transport_error(error: &reqwest::Error) -> ClientError {
    ClientError::rpc_with_message(RpcKind::Unavailable, error.to_string())
}
