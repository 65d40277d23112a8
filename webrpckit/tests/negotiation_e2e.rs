//! Content negotiation and method routing at the HTTP boundary.

use std::net::SocketAddr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use webrpckit::prelude::*;

#[derive(Debug, Serialize, Deserialize)]
struct EchoMessage {
    text: String,
}

const ECHO: Method<EchoMessage, EchoMessage> = Method::unary("echo");

async fn spawn_server() -> SocketAddr {
    let router = RpcRouter::new()
        .unary(ECHO, |req: EchoMessage, _ctx| async move { Ok(req) })
        .into_router();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A codec that speaks JSON but declares a different content type, to
/// provoke strict negotiation.
#[derive(Debug, Clone, Copy)]
struct OtherContentType;

impl Codec for OtherContentType {
    fn content_type(&self) -> &'static str {
        "application/grpc-web+cbor"
    }

    fn encode_request<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError> {
        JsonCodec.encode_request(method, value)
    }

    fn decode_request<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        JsonCodec.decode_request(method, bytes)
    }

    fn encode_message<T: Serialize>(&self, method: &str, value: &T) -> Result<Bytes, CodecError> {
        JsonCodec.encode_message(method, value)
    }

    fn decode_message<T: DeserializeOwned>(
        &self,
        method: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        JsonCodec.decode_message(method, bytes)
    }

    fn encode_trailer(&self, trailer: &TrailerMap) -> Bytes {
        JsonCodec.encode_trailer(trailer)
    }

    fn decode_trailer(&self, bytes: &[u8]) -> Result<TrailerMap, CodecError> {
        JsonCodec.decode_trailer(bytes)
    }
}

#[tokio::test]
async fn test_mismatched_accept_is_rejected_with_406() {
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/echo"))
        .header("content-type", "application/grpc-web+json")
        .header("accept", "application/json")
        .body(r#"{"text":"hi"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 406);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_client_surfaces_negotiation_failure_as_unknown() {
    let addr = spawn_server().await;
    let client = ClientBuilder::new(format!("http://{addr}"))
        .codec(OtherContentType)
        .build()
        .unwrap();

    let err = client
        .unary(
            ECHO,
            EchoMessage {
                text: "hi".to_string(),
            },
        )
        .await
        .unwrap_err();

    // 406 has no entry in the status table; it decodes as unknown.
    assert_eq!(err.kind(), RpcKind::Unknown);
}

#[tokio::test]
async fn test_non_post_is_rejected_with_405() {
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/echo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test]
async fn test_wildcard_accept_is_rejected_with_406() {
    // Negotiation is strict: even */* (reqwest's default) is not the
    // declared content type.
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/echo"))
        .header("content-type", "application/grpc-web+json")
        .body(r#"{"text":"hi"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 406);
}

#[tokio::test]
async fn test_malformed_request_body_is_internal() {
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/echo"))
        .header("content-type", "application/grpc-web+json")
        .header("accept", "application/grpc-web+json")
        .body("not json at all")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(
        response.headers().get("grpc-status").unwrap(),
        &RpcKind::Internal.grpc_status().to_string()
    );
}
