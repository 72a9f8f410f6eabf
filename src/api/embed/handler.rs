// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed and POST /embed/batch HTTP handlers
//!
//! Both handlers validate the body, encode through the shared model handle,
//! optionally L2-normalize, and serialize the vectors. A batch succeeds or
//! fails as a whole.

use crate::api::embed::{
    BatchEmbedRequest, BatchEmbedResponse, SingleEmbedRequest, SingleEmbedResponse,
};
use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::embeddings::{normalize_in_place, normalize_rows};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::debug;

/// POST /embed handler
///
/// # Request Body
/// ```json
/// { "text": "hello", "normalize": true }
/// ```
///
/// # Response Body
/// ```json
/// { "embedding": [0.1, 0.2, ...] }
/// ```
pub async fn embed_handler(
    State(state): State<AppState>,
    payload: Result<Json<SingleEmbedRequest>, JsonRejection>,
) -> Result<Json<SingleEmbedResponse>, ApiError> {
    let Json(request) = payload?;
    let normalize = request.wants_normalized();
    let text = request.validate()?;

    let mut embedding = state.model.encode(text).await?;
    if normalize {
        normalize_in_place(&mut embedding);
    }

    debug!("Embedded 1 text ({} dimensions)", embedding.len());
    Ok(Json(SingleEmbedResponse { embedding }))
}

/// POST /embed/batch handler
///
/// # Request Body
/// ```json
/// { "texts": ["first", "second"], "normalize": true }
/// ```
///
/// # Response Body
/// ```json
/// { "embeddings": [[0.1, ...], [0.3, ...]] }
/// ```
pub async fn embed_batch_handler(
    State(state): State<AppState>,
    payload: Result<Json<BatchEmbedRequest>, JsonRejection>,
) -> Result<Json<BatchEmbedResponse>, ApiError> {
    let Json(request) = payload?;
    let normalize = request.wants_normalized();
    let texts = request.validate()?;

    let mut embeddings = state.model.encode_batch(texts).await?;
    if normalize {
        normalize_rows(&mut embeddings);
    }

    debug!("Embedded batch of {} texts", embeddings.len());
    Ok(Json(BatchEmbedResponse { embeddings }))
}
