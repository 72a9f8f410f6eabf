// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for embedding model loading and inference

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the model handle and its encoders
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The model could not be resolved, fetched or initialized at start-up
    #[error("Failed to load embedding model '{model}': {reason}")]
    ModelLoad { model: String, reason: String },

    /// Client input rejected before reaching the model
    #[error("{message}")]
    InvalidInput { field: String, message: String },

    /// The model failed while encoding a request
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Inference did not finish within the configured budget
    #[error("Inference timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl EmbedError {
    pub fn model_load(model: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EmbedError::ModelLoad {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        EmbedError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn inference(reason: impl std::fmt::Display) -> Self {
        EmbedError::Inference(reason.to_string())
    }
}
