use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use regroup_core::{embed_labels, Embedder, RegroupError};
use regroup_embed::{EmbeddingClient, RemoteEmbeddingClient};
use serde_json::{json, Value};

/// Serves `app` on an ephemeral port from a background runtime.
fn spawn_stub(app: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    addr
}

async fn reversed_embeddings(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let mut data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let len = text.as_str().map(str::len).unwrap_or(0) as f64;
            json!({"object": "embedding", "index": i, "embedding": [len, i as f64]})
        })
        .collect();
    data.reverse();
    (StatusCode::OK, Json(json!({"data": data, "model": body["model"]})))
}

async fn short_embeddings(Json(body): Json<Value>) -> Json<Value> {
    let count = body["input"].as_array().map(Vec::len).unwrap_or(0);
    let data: Vec<Value> = (1..count).map(|_| json!({"embedding": [1.0]})).collect();
    Json(json!({"data": data}))
}

async fn failing_embeddings() -> (StatusCode, &'static str) {
    (StatusCode::TOO_MANY_REQUESTS, "slow down")
}

async fn slow_embeddings() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"data": []}))
}

fn client(addr: SocketAddr, key: Option<&str>, timeout: Duration) -> EmbeddingClient {
    EmbeddingClient::remote(
        RemoteEmbeddingClient::new(
            &format!("http://{addr}/v1/"),
            "voyage-large-2",
            key.map(str::to_string),
            timeout,
        )
        .unwrap(),
    )
}

fn labels(n: usize) -> Vec<String> {
    (0..n).map(|i| "x".repeat(i + 1)).collect()
}

#[test]
fn embeds_in_order_across_batches() {
    let addr = spawn_stub(Router::new().route("/v1/embeddings", post(reversed_embeddings)));
    let client = client(addr, Some("test-key"), Duration::from_secs(5));
    let vectors = embed_labels(&client, &labels(5), 2, false).unwrap();
    assert_eq!(vectors.len(), 5);
    for (i, v) in vectors.iter().enumerate() {
        assert_eq!(v[0], (i + 1) as f32);
        assert_eq!(v[1], (i % 2) as f32);
    }
}

#[test]
fn non_success_status_is_an_error() {
    let addr = spawn_stub(Router::new().route("/v1/embeddings", post(failing_embeddings)));
    let client = client(addr, Some("test-key"), Duration::from_secs(5));
    let err = client.embed_batch(&labels(2)).unwrap_err();
    assert!(format!("{err:#}").contains("429"));
}

#[test]
fn missing_key_is_rejected_by_the_service() {
    let addr = spawn_stub(Router::new().route("/v1/embeddings", post(reversed_embeddings)));
    let client = client(addr, None, Duration::from_secs(5));
    let err = embed_labels(&client, &labels(3), 128, false).unwrap_err();
    assert!(matches!(err, RegroupError::EmbeddingService(_)));
}

#[test]
fn short_response_is_a_service_error() {
    let addr = spawn_stub(Router::new().route("/v1/embeddings", post(short_embeddings)));
    let client = client(addr, Some("test-key"), Duration::from_secs(5));
    let err = embed_labels(&client, &labels(4), 128, false).unwrap_err();
    assert!(matches!(err, RegroupError::EmbeddingService(_)));
}

#[test]
fn timeout_is_a_service_error() {
    let addr = spawn_stub(Router::new().route("/v1/embeddings", post(slow_embeddings)));
    let client = client(addr, Some("test-key"), Duration::from_millis(200));
    let err = embed_labels(&client, &labels(2), 128, false).unwrap_err();
    assert!(matches!(err, RegroupError::EmbeddingService(_)));
}
