//! End-to-end unary calls over a real HTTP server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::time::timeout;

use webrpckit::prelude::*;
use webrpckit::{ChunkParser, FrameKind};

#[derive(Debug, Serialize, Deserialize)]
struct IncrementRequest {
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IncrementResponse {
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloRequest {
    language: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloResponse {
    text: String,
}

const INCREMENT: Method<IncrementRequest, IncrementResponse> = Method::unary("increment");
const GET_HELLO: Method<HelloRequest, HelloResponse> = Method::unary("getHello");

async fn spawn_server(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn increment_router() -> RpcRouter {
    RpcRouter::new().unary(INCREMENT, |req: IncrementRequest, _ctx| async move {
        Ok(IncrementResponse {
            value: req.value + 1,
        })
    })
}

#[tokio::test]
async fn test_unary_success() {
    let addr = spawn_server(increment_router().into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let response = timeout(
        Duration::from_secs(5),
        client.unary(INCREMENT, IncrementRequest { value: 10 }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.value, 11);
}

#[tokio::test]
async fn test_unary_not_found_with_message_split() {
    let reported: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_reports = Arc::clone(&reported);

    let router = RpcRouter::new()
        .report_error(move |error, site| {
            sink_reports
                .lock()
                .unwrap()
                .push((error.to_string(), site.url.to_string()));
        })
        .unary(GET_HELLO, |req: HelloRequest, _ctx| async move {
            Err::<HelloResponse, _>(
                ServerRpcError::new(RpcKind::NotFound)
                    .with_internal_message("greeting table lookup missed")
                    .with_transmitted_message(format!("language '{}' not found", req.language))
                    .into(),
            )
        })
        .into_router();
    let addr = spawn_server(router).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let err = client
        .unary(
            GET_HELLO,
            HelloRequest {
                language: "x".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcKind::NotFound);
    assert_eq!(err.message(), Some("language 'x' not found"));
    // The internal message must never reach the client...
    assert!(!err.to_string().contains("greeting table"));

    // ...but the report sink sees it, along with the call site.
    let reports = reported.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].0.contains("greeting table lookup missed"));
    assert_eq!(reports[0].1, "/getHello");
}

#[tokio::test]
async fn test_request_too_large() {
    let addr = spawn_server(increment_router().request_limit(5).into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    // {"value":10} is 16 bytes; the limit is 5.
    let err = client
        .unary(INCREMENT, IncrementRequest { value: 10 })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcKind::InvalidArgument);
    assert_eq!(err.message(), Some("Request Too Large"));
}

#[tokio::test]
async fn test_unknown_method_maps_from_http_404() {
    let addr = spawn_server(increment_router().into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    const MISSING: Method<IncrementRequest, IncrementResponse> = Method::unary("missing");
    let err = client
        .unary(MISSING, IncrementRequest { value: 1 })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcKind::NotFound);
}

#[tokio::test]
async fn test_error_carries_response_context() {
    let router = RpcRouter::new()
        .unary(GET_HELLO, |_req: HelloRequest, _ctx| async move {
            Err::<HelloResponse, _>(ServerRpcError::new(RpcKind::FailedPrecondition).into())
        })
        .into_router();
    let addr = spawn_server(router).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let err = client
        .unary(
            GET_HELLO,
            HelloRequest {
                language: "en".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RpcKind::FailedPrecondition);
    let ctx = err.response_context().expect("context must be attached");
    assert_eq!(
        ctx.get("grpc-status"),
        Some(RpcKind::FailedPrecondition.grpc_status().to_string().as_str())
    );
}

#[tokio::test]
async fn test_raw_wire_shape_of_unary_success() {
    // The response body must be exactly one message frame followed by
    // one trailer frame with grpc-status 0.
    let addr = spawn_server(increment_router().into_router()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/increment"))
        .header("content-type", "application/grpc-web+json")
        .header("accept", "application/grpc-web+json")
        .body(r#"{"value":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/grpc-web+json"
    );

    let body = response.bytes().await.unwrap();
    let mut parser = ChunkParser::new();
    let frames = parser.push(&body);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].kind, FrameKind::Message);
    let value: serde_json::Value = serde_json::from_slice(&frames[0].payload).unwrap();
    assert_eq!(value["value"], 2);
    assert_eq!(frames[1].kind, FrameKind::Trailer);
    let trailer = JsonCodec.decode_trailer(&frames[1].payload).unwrap();
    assert_eq!(trailer.grpc_status(), Some(0));
}
