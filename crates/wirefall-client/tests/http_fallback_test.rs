//! Fallback Channel Integration Tests
//!
//! These tests verify the HTTP fallback driver's ability to:
//! - Exchange request/response envelopes over HTTP POST
//! - Attach the bearer credential when one is configured
//! - Retry on transient errors (5xx, transport failures)
//! - Not retry on permanent errors (4xx, RPC errors, malformed bodies)
//! - Handle concurrent requests with distinct correlation ids

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use wirefall_client::{
    ClientConfig, ClientOptions, RetryConfig, TransportMode, WirefallClient, WirefallError,
};
use wirefall_common::{RequestEnvelope, ResponseEnvelope, RpcErrorBody};

fn http_client(base_url: &str, retry: RetryConfig) -> WirefallClient {
    let options = ClientOptions::new()
        .base_url(base_url)
        .transport(TransportMode::Http)
        .retry(retry)
        .timeout(Duration::from_secs(5));
    let config = ClientConfig::resolve_with_env(options, &HashMap::new()).unwrap();
    WirefallClient::with_config(config)
}

fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig::constant(attempts, 10).unwrap()
}

/// Spawns an HTTP server whose behavior is decided per request by `respond`.
async fn spawn_server<F>(respond: F) -> String
where
    F: Fn(usize, RequestEnvelope) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let io = TokioIo::new(stream);
            let respond = respond.clone();
            let calls = calls.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let respond = respond.clone();
                    let calls = calls.clone();
                    async move {
                        let count = calls.fetch_add(1, Ordering::SeqCst);
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        let envelope: RequestEnvelope = serde_json::from_slice(&body).unwrap();
                        Ok::<_, hyper::Error>(respond(count, envelope))
                    }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    format!("http://{}", addr)
}

fn json_response(status: StatusCode, envelope: &ResponseEnvelope) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(envelope).unwrap())))
        .unwrap()
}

fn plain_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[tokio::test]
async fn test_basic_call_echoes_params() {
    let base_url = spawn_server(|_, envelope| {
        json_response(
            StatusCode::OK,
            &ResponseEnvelope::success(envelope.id, Value::Array(envelope.params)),
        )
    })
    .await;

    let client = http_client(&base_url, fast_retry(0));
    let result = client
        .call("echo", vec![json!({"hello": "world"}), json!(2)])
        .await
        .unwrap();

    assert_eq!(result, json!([{"hello": "world"}, 2]));
}

#[tokio::test]
async fn test_bearer_credential_is_attached() {
    let seen_auth = Arc::new(Mutex::new(None::<String>));
    let seen_auth_server = seen_auth.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let io = TokioIo::new(stream);
        let seen_auth = seen_auth_server.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let seen_auth = seen_auth.clone();
            async move {
                *seen_auth.lock().unwrap() = req
                    .headers()
                    .get("authorization")
                    .map(|v| v.to_str().unwrap().to_string());
                assert_eq!(
                    req.headers().get("content-type").unwrap(),
                    "application/json"
                );
                let body = req.into_body().collect().await.unwrap().to_bytes();
                let envelope: RequestEnvelope = serde_json::from_slice(&body).unwrap();
                Ok::<_, hyper::Error>(json_response(
                    StatusCode::OK,
                    &ResponseEnvelope::success(envelope.id, json!(null)),
                ))
            }
        });
        let _ = http1::Builder::new().serve_connection(io, service).await;
    });

    let options = ClientOptions::new()
        .base_url(format!("http://{}", addr))
        .transport(TransportMode::Http)
        .api_key("secret-key");
    let config = ClientConfig::resolve_with_env(options, &HashMap::new()).unwrap();
    let client = WirefallClient::with_config(config);

    client.call("ping", vec![]).await.unwrap();
    assert_eq!(
        seen_auth.lock().unwrap().as_deref(),
        Some("Bearer secret-key")
    );
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_rpc_error_body_surfaces_without_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_server = calls.clone();

    let base_url = spawn_server(move |_, envelope| {
        calls_server.fetch_add(1, Ordering::SeqCst);
        json_response(
            StatusCode::OK,
            &ResponseEnvelope::error(envelope.id, RpcErrorBody::method_not_found("nope")),
        )
    })
    .await;

    let client = http_client(&base_url, fast_retry(3));
    let err = client.call("nope", vec![]).await.unwrap_err();

    match err {
        WirefallError::Rpc(body) => {
            assert_eq!(body.code, -32601);
            assert!(body.message.contains("nope"));
        }
        other => panic!("expected Rpc error, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rpc_error_wins_over_http_status() {
    // A structured error body inside a 500 is an application error, not a
    // retryable server failure
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_server = calls.clone();

    let base_url = spawn_server(move |_, envelope| {
        calls_server.fetch_add(1, Ordering::SeqCst);
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ResponseEnvelope::error(envelope.id, RpcErrorBody::internal_error("boom")),
        )
    })
    .await;

    let client = http_client(&base_url, fast_retry(3));
    let err = client.call("explode", vec![]).await.unwrap_err();

    assert!(matches!(err, WirefallError::Rpc(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_4xx_is_never_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_server = calls.clone();

    let base_url = spawn_server(move |_, _| {
        calls_server.fetch_add(1, Ordering::SeqCst);
        plain_response(StatusCode::BAD_REQUEST, "bad request")
    })
    .await;

    let client = http_client(&base_url, fast_retry(3));
    let err = client.call("test", vec![]).await.unwrap_err();

    match err {
        WirefallError::Client { status, .. } => assert_eq!(status, 400),
        other => panic!("expected Client error, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_server = calls.clone();

    let base_url = spawn_server(move |_, _| {
        calls_server.fetch_add(1, Ordering::SeqCst);
        plain_response(StatusCode::OK, "this is not json")
    })
    .await;

    let client = http_client(&base_url, fast_retry(3));
    let err = client.call("test", vec![]).await.unwrap_err();

    assert!(matches!(err, WirefallError::InvalidResponse(_)));
    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Retry Logic Tests
// ============================================================================

#[tokio::test]
async fn test_5xx_retries_then_succeeds() {
    let base_url = spawn_server(|count, envelope| {
        // Fail first two attempts, succeed on the third
        if count < 2 {
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "server error")
        } else {
            json_response(
                StatusCode::OK,
                &ResponseEnvelope::success(envelope.id, Value::Array(envelope.params)),
            )
        }
    })
    .await;

    let client = http_client(&base_url, fast_retry(2));
    let result = client.call("test", vec![json!("retry")]).await.unwrap();

    assert_eq!(result, json!(["retry"]));
}

#[tokio::test]
async fn test_5xx_retries_exactly_attempts_times_then_surfaces() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_server = calls.clone();

    let base_url = spawn_server(move |_, _| {
        calls_server.fetch_add(1, Ordering::SeqCst);
        plain_response(StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    })
    .await;

    let client = http_client(&base_url, fast_retry(2));
    let err = client.call("test", vec![]).await.unwrap_err();

    match err {
        WirefallError::Server { status, .. } => assert_eq!(status, 503),
        other => panic!("expected Server error, got {:?}", other),
    }
    // Initial attempt plus exactly two retries
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let client = http_client("http://127.0.0.1:19999", fast_retry(0));
    let err = client.call("test", vec![json!(1)]).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_call_timeout_is_enforced() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and stall: never answer
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let options = ClientOptions::new()
        .base_url(format!("http://{}", addr))
        .transport(TransportMode::Http)
        .retry(fast_retry(0))
        .timeout(Duration::from_millis(100));
    let config = ClientConfig::resolve_with_env(options, &HashMap::new()).unwrap();
    let client = WirefallClient::with_config(config);

    let err = client.call("test", vec![]).await.unwrap_err();
    assert!(matches!(err, WirefallError::Timeout(_)));
}

// ============================================================================
// Concurrent Requests Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_get_distinct_correlation_ids() {
    let seen_ids = Arc::new(Mutex::new(Vec::new()));
    let seen_ids_server = seen_ids.clone();

    let base_url = spawn_server(move |_, envelope| {
        seen_ids_server.lock().unwrap().push(envelope.id);
        json_response(
            StatusCode::OK,
            &ResponseEnvelope::success(envelope.id, Value::Array(envelope.params)),
        )
    })
    .await;

    let client = http_client(&base_url, fast_retry(0));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.call("test", vec![json!(i)]).await })
        })
        .collect();

    for (i, task) in futures::future::join_all(tasks).await.into_iter().enumerate() {
        assert_eq!(task.unwrap().unwrap(), json!([i]));
    }

    let ids = seen_ids.lock().unwrap();
    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(unique.len(), 10, "correlation ids must be distinct");
}
