// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sentence embedding models
//!
//! The [`ModelHandle`] is created once at start-up and shared read-only by all
//! request handlers. It drives a [`TextEncoder`], normally the ONNX Runtime
//! backed [`OnnxEmbeddingModel`], on the blocking thread pool.

pub mod errors;
pub mod hashed;
pub mod model_handle;
pub mod model_source;
pub mod normalize;
pub mod onnx_model;

pub use errors::EmbedError;
pub use hashed::HashEncoder;
pub use model_handle::{ModelConfig, ModelHandle};
pub use model_source::ModelSource;
pub use normalize::{l2_norm, normalize_in_place, normalize_rows};
pub use onnx_model::{OnnxEmbeddingModel, OnnxOptions};

/// Ordered, fixed-length vector produced by the model
pub type EmbeddingVector = Vec<f32>;

/// Turns text into embedding vectors.
///
/// Implementations are synchronous and may block for the duration of model
/// inference; async callers go through [`ModelHandle`], which offloads to
/// `tokio::task::spawn_blocking`.
pub trait TextEncoder: Send + Sync {
    /// Output dimension, constant for the lifetime of the encoder
    fn dimension(&self) -> usize;

    /// Encodes a single text
    fn encode(&self, text: &str) -> Result<EmbeddingVector, EmbedError>;

    /// Encodes a batch, one vector per input in input order
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}
