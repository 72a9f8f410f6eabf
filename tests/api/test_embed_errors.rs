// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Error Handling Tests for the embedding endpoints
//!
//! This module tests the error paths to ensure:
//! - Malformed bodies are client errors, never crashes
//! - Inference failures surface as 500 for that request only
//! - Degenerate all-zero model output survives normalization
//! - A failing request does not affect concurrent ones

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mockall::mock;
use sigma_embed::{
    api::{create_app, AppState, BatchEmbedResponse, SingleEmbedResponse},
    embeddings::{EmbedError, HashEncoder, ModelHandle, TextEncoder},
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

mock! {
    pub Encoder {}

    impl TextEncoder for Encoder {
        fn dimension(&self) -> usize;
        fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
        fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
    }
}

fn app_with(encoder: impl TextEncoder + 'static) -> Router {
    let handle = ModelHandle::from_encoder("test-model", Arc::new(encoder), None);
    create_app(AppState::new(handle))
}

fn post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
}

//
// Malformed requests
//

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = app_with(HashEncoder::new(8).unwrap());
    let (status, json) = send(app, post("/embed", "application/json", "{\"text\": ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_type"], "invalid_request");
}

#[tokio::test]
async fn test_wrong_field_type_is_400() {
    let app = app_with(HashEncoder::new(8).unwrap());
    let (status, _) = send(app, post("/embed", "application/json", r#"{"text": 42}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let app = app_with(HashEncoder::new(8).unwrap());
    let (status, _) = send(
        app,
        post("/embed/batch", "application/json", r#"{"texts": "not a list"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_content_type_is_400() {
    let app = app_with(HashEncoder::new(8).unwrap());
    let (status, json) = send(app, post("/embed", "text/plain", r#"{"text": "hi"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn test_validation_never_reaches_model() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder.expect_encode().never();
    encoder.expect_encode_batch().never();
    let app = app_with(encoder);

    let request = post("/embed", "application/json", r#"{"text": " "}"#);
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = post("/embed/batch", "application/json", r#"{"texts": []}"#);
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//
// Inference failures
//

#[tokio::test]
async fn test_inference_failure_is_500() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder
        .expect_encode()
        .returning(|_| Err(EmbedError::Inference("tensor shape mismatch".to_string())));
    let app = app_with(encoder);

    let request = post("/embed", "application/json", r#"{"text": "hello"}"#);
    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error_type"], "internal_error");
    assert_eq!(json["detail"], "tensor shape mismatch");
    assert!(json["request_id"].is_string());
}

#[tokio::test]
async fn test_batch_failure_fails_whole_batch() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder
        .expect_encode_batch()
        .returning(|_| Err(EmbedError::Inference("item 2 failed".to_string())));
    let app = app_with(encoder);

    let (status, json) = send(
        app,
        post("/embed/batch", "application/json", r#"{"texts": ["a", "b", "c"]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json.get("embeddings").is_none());
}

#[tokio::test]
async fn test_wrong_dimension_from_model_is_500() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder.expect_encode().returning(|_| Ok(vec![1.0; 3]));
    let app = app_with(encoder);

    let (status, _) = send(app, post("/embed", "application/json", r#"{"text": "hello"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_slow_inference_times_out_with_504() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder.expect_encode().returning(|_| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(vec![1.0; 4])
    });
    let handle = ModelHandle::from_encoder(
        "test-model",
        Arc::new(encoder),
        Some(Duration::from_millis(20)),
    );
    let app = create_app(AppState::new(handle));

    let request = post("/embed", "application/json", r#"{"text": "hello"}"#);
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["error_type"], "timeout");
}

/// Encoder that serializes calls on a lock, as the ONNX session does
struct SerializedEncoder {
    session: Mutex<()>,
    hold: Duration,
}

impl TextEncoder for SerializedEncoder {
    fn dimension(&self) -> usize {
        4
    }

    fn encode(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        let _guard = self.session.lock().unwrap();
        std::thread::sleep(self.hold);
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

#[tokio::test]
async fn test_timeouts_under_load_do_not_poison_later_requests() {
    let encoder = SerializedEncoder {
        session: Mutex::new(()),
        hold: Duration::from_millis(100),
    };
    let handle = ModelHandle::from_encoder(
        "test-model",
        Arc::new(encoder),
        Some(Duration::from_millis(250)),
    );
    let app = create_app(AppState::new(handle));

    let burst = (0..8).map(|i| {
        let body = serde_json::json!({ "text": format!("burst {}", i) }).to_string();
        send(app.clone(), post("/embed", "application/json", &body))
    });
    let statuses: Vec<StatusCode> = futures_util::future::join_all(burst)
        .await
        .into_iter()
        .map(|(status, _)| status)
        .collect();
    assert_eq!(statuses[0], StatusCode::OK);
    assert!(statuses.contains(&StatusCode::GATEWAY_TIMEOUT));

    // A single request on an otherwise idle service succeeds
    let request = post("/embed", "application/json", r#"{"text": "after"}"#);
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
}

//
// Degenerate output
//

#[tokio::test]
async fn test_zero_vector_stays_zero_when_normalized() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder.expect_encode().returning(|_| Ok(vec![0.0; 4]));
    encoder
        .expect_encode_batch()
        .returning(|texts| Ok(vec![vec![0.0; 4]; texts.len()]));
    let app = app_with(encoder);

    let (status, json) = send(
        app.clone(),
        post("/embed", "application/json", r#"{"text": "silence"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let single: SingleEmbedResponse = serde_json::from_value(json).unwrap();
    assert_eq!(single.embedding, vec![0.0; 4]);

    let (status, json) = send(
        app,
        post("/embed/batch", "application/json", r#"{"texts": ["a", "b"]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let batch: BatchEmbedResponse = serde_json::from_value(json).unwrap();
    assert_eq!(batch.embeddings, vec![vec![0.0; 4]; 2]);
}

//
// Isolation
//

#[tokio::test]
async fn test_concurrent_request_errors_isolated() {
    let mut encoder = MockEncoder::new();
    encoder.expect_dimension().return_const(4usize);
    encoder.expect_encode().returning(|text| {
        if text == "poison" {
            Err(EmbedError::Inference("poisoned input".to_string()))
        } else {
            Ok(vec![1.0, 2.0, 2.0, 0.0])
        }
    });
    let app = app_with(encoder);

    let requests = ["ok one", "poison", "ok two", "poison", "ok three"].map(|text| {
        let body = serde_json::json!({ "text": text }).to_string();
        send(app.clone(), post("/embed", "application/json", &body))
    });
    let results = futures_util::future::join_all(requests).await;

    let statuses: Vec<StatusCode> = results.iter().map(|(status, _)| *status).collect();
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::OK,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::OK,
        ]
    );

    // Normalized [1, 2, 2, 0] / 3
    let ok: SingleEmbedResponse = serde_json::from_value(results[0].1.clone()).unwrap();
    let expected = [1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0, 0.0];
    for (a, e) in ok.embedding.iter().zip(expected) {
        assert!((a - e).abs() < 1e-6);
    }

    // Service keeps working afterwards
    let (status, _) = send(app, post("/embed", "application/json", r#"{"text": "after"}"#)).await;
    assert_eq!(status, StatusCode::OK);
}
