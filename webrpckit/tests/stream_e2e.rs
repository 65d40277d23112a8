//! End-to-end server streaming over a real HTTP server.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::time::timeout;

use webrpckit::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    max: u32,
    sleep_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Tick {
    counter: u32,
}

const STREAM_NUMBERS: Method<StreamRequest, Tick> = Method::server_stream("streamNumbers");

async fn spawn_server(router: axum::Router) -> SocketAddr {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn numbers_router() -> RpcRouter {
    RpcRouter::new().server_stream(
        STREAM_NUMBERS,
        |req: StreamRequest, responder, _ctx| async move {
            responder.ready()?;
            for counter in 0..req.max {
                if responder.is_closed() {
                    break;
                }
                responder.send(&Tick { counter })?;
                tokio::time::sleep(Duration::from_millis(req.sleep_ms)).await;
            }
            Ok(())
        },
    )
}

#[tokio::test]
async fn test_stream_collects_all_messages() {
    let addr = spawn_server(numbers_router().into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let messages = timeout(
        Duration::from_secs(5),
        client
            .server_stream(STREAM_NUMBERS, StreamRequest { max: 5, sleep_ms: 0 })
            .collect(),
    )
    .await
    .unwrap()
    .unwrap();

    let counters: Vec<u32> = messages.into_iter().map(|m| m.value.counter).collect();
    assert_eq!(counters, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_stream_mid_stream_cancel() {
    let addr = spawn_server(numbers_router().into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let mut stream = client.server_stream(
        STREAM_NUMBERS,
        StreamRequest {
            max: 10,
            sleep_ms: 50,
        },
    );
    stream.start();

    let mut observed = Vec::new();
    let mut received = 0u32;
    loop {
        let event = timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .expect("terminal event not yet seen");
        match &event {
            StreamEvent::Message(message) => {
                observed.push(format!("message({})", message.value.counter));
                received += 1;
                if received == 3 {
                    stream.cancel();
                }
            }
            StreamEvent::Ready => observed.push("ready".to_string()),
            StreamEvent::Canceled => {
                observed.push("canceled".to_string());
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(
        observed,
        vec!["ready", "message(0)", "message(1)", "message(2)", "canceled"]
    );
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_handler_without_ready_is_empty_success() {
    let router = RpcRouter::new()
        .server_stream(
            STREAM_NUMBERS,
            |_req: StreamRequest, _responder, _ctx| async move { Ok(()) },
        )
        .into_router();
    let addr = spawn_server(router).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let messages = client
        .server_stream(STREAM_NUMBERS, StreamRequest { max: 3, sleep_ms: 0 })
        .collect()
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_mid_stream_error_arrives_via_trailer() {
    let router = RpcRouter::new()
        .server_stream(
            STREAM_NUMBERS,
            |_req: StreamRequest, responder, _ctx| async move {
                responder.ready()?;
                responder.send(&Tick { counter: 0 })?;
                responder.send(&Tick { counter: 1 })?;
                Err(ServerRpcError::new(RpcKind::FailedPrecondition)
                    .with_transmitted_message("counter store went away")
                    .into())
            },
        )
        .into_router();
    let addr = spawn_server(router).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let mut stream =
        client.server_stream(STREAM_NUMBERS, StreamRequest { max: 0, sleep_ms: 0 });
    stream.start();

    let mut counters = Vec::new();
    let error = loop {
        match timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .expect("terminal event not yet seen")
        {
            StreamEvent::Ready => {}
            StreamEvent::Message(message) => counters.push(message.value.counter),
            StreamEvent::Error(error) => break error,
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert_eq!(counters, vec![0, 1]);
    assert_eq!(error.kind(), RpcKind::FailedPrecondition);
    assert_eq!(error.message(), Some("counter store went away"));
}

#[tokio::test]
async fn test_send_before_ready_fails_the_call() {
    let router = RpcRouter::new()
        .server_stream(
            STREAM_NUMBERS,
            |_req: StreamRequest, responder, _ctx| async move {
                // Misuse: the state machine requires ready() first.
                responder.send(&Tick { counter: 0 })?;
                Ok(())
            },
        )
        .into_router();
    let addr = spawn_server(router).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let err = client
        .server_stream(STREAM_NUMBERS, StreamRequest { max: 1, sleep_ms: 0 })
        .collect()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RpcKind::Internal);
}

#[tokio::test]
async fn test_messages_carry_decoded_response_context() {
    let addr = spawn_server(numbers_router().into_router()).await;
    let client = Client::new(format!("http://{addr}")).unwrap();

    let messages = client
        .server_stream(STREAM_NUMBERS, StreamRequest { max: 1, sleep_ms: 0 })
        .collect()
        .await
        .unwrap();

    // The pass-through connector surfaces the raw response headers.
    assert_eq!(
        messages[0].context.get("content-type"),
        Some("application/grpc-web+json")
    );
}
