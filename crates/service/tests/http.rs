use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use regroup_core::{HashEmbedder, RegroupConfig};
use regroup_service::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let state = AppState::new(Box::new(HashEmbedder::default()), RegroupConfig::default())
        .expect("state");
    router(Arc::new(state))
}

fn region_payload() -> Value {
    json!({
        "tables": [{
            "groups": [{"name": "region"}],
            "fields": [
                {"name": "region", "type": "string"},
                {"name": "revenue", "agg": {"name": "count"}}
            ],
            "columns": [["north east", "north west", "south coast", "south bay"], [10, 12, 100, 105]]
        }]
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).expect("json body")
}

fn assert_regrouped(payload: &Value) {
    let table = &payload["tables"][0];
    assert_eq!(table["groups"], json!([{"name": "region"}]));
    assert_eq!(table["fields"][0], json!({"name": "region", "type": "string"}));
    let values: Vec<i64> = table["columns"][1]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    assert_eq!(values.len(), 2);
    assert!(values[0] >= values[1]);
    assert_eq!(values.iter().sum::<i64>(), 227);
    let members: usize = table["group_membership"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_array().unwrap().len())
        .sum();
    assert_eq!(members, 4);
}

#[tokio::test]
async fn regroup_returns_rewritten_table() {
    let response = app()
        .oneshot(
            Request::post("/regroup")
                .header("content-type", "application/json")
                .body(Body::from(region_payload().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_regrouped(&body_json(response).await);
}

#[tokio::test]
async fn regroup_accepts_base64_bodies() {
    let encoded = general_purpose::STANDARD.encode(region_payload().to_string());
    let response = app()
        .oneshot(
            Request::post("/regroup")
                .header("content-transfer-encoding", "base64")
                .body(Body::from(encoded))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_regrouped(&body_json(response).await);
}

#[tokio::test]
async fn undecodable_body_is_400() {
    let response = app()
        .oneshot(
            Request::post("/regroup?base64=true")
                .body(Body::from("%%%"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("Failed to decode request body"));
}

#[tokio::test]
async fn ragged_table_is_422() {
    let mut payload = region_payload();
    payload["tables"][0]["columns"][1] = json!([1, 2]);
    let response = app()
        .oneshot(
            Request::post("/regroup")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn single_row_is_422() {
    let payload = json!({
        "tables": [{
            "groups": [{"name": "region"}],
            "fields": [{"name": "region"}, {"name": "n", "agg": {"name": "count"}}],
            "columns": [["A"], [1]]
        }]
    });
    let response = app()
        .oneshot(
            Request::post("/regroup")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn invoke_wraps_status_and_body() {
    let event = json!({
        "body": general_purpose::STANDARD.encode(region_payload().to_string()),
        "isBase64Encoded": true
    });
    let response = app()
        .oneshot(
            Request::post("/invoke")
                .header("content-type", "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let envelope = body_json(response).await;
    assert_eq!(envelope["statusCode"], json!(200));
    let inner: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert_regrouped(&inner);
}

#[tokio::test]
async fn invoke_reports_decode_failures() {
    let event = json!({"body": "not base64 at all!", "isBase64Encoded": true});
    let response = app()
        .oneshot(
            Request::post("/invoke")
                .header("content-type", "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let envelope = body_json(response).await;
    assert_eq!(envelope["statusCode"], json!(400));
}

#[tokio::test]
async fn health_is_ok() {
    let response = app()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
