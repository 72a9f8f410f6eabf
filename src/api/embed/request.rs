// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request bodies for POST /embed and POST /embed/batch
//!
//! Required fields are optional at the serde level so that a missing field
//! reaches validation and comes back as a 400 with a readable message.

use crate::embeddings::EmbedError;
use serde::{Deserialize, Serialize};

/// Request body for POST /embed
///
/// # Example
/// ```json
/// { "text": "Quarterly report attached", "normalize": true }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleEmbedRequest {
    /// Text to embed; must contain something besides whitespace
    #[serde(default)]
    pub text: Option<String>,

    /// L2-normalize the output (default: true, an explicit null disables it)
    #[serde(default = "default_normalize")]
    pub normalize: Option<bool>,
}

/// Request body for POST /embed/batch
///
/// # Example
/// ```json
/// { "texts": ["first", "second"], "normalize": false }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbedRequest {
    /// Texts to embed, in the order the vectors are returned
    #[serde(default)]
    pub texts: Option<Vec<String>>,

    /// L2-normalize each output row (default: true, an explicit null disables it)
    #[serde(default = "default_normalize")]
    pub normalize: Option<bool>,
}

fn default_normalize() -> Option<bool> {
    Some(true)
}

impl SingleEmbedRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            normalize: default_normalize(),
        }
    }

    /// Whether the caller asked for a unit-length vector
    pub fn wants_normalized(&self) -> bool {
        self.normalize == Some(true)
    }

    /// Validates the request, returning the text to embed
    ///
    /// The text is passed to the model as sent; trimming is only used for
    /// the emptiness check.
    pub fn validate(self) -> Result<String, EmbedError> {
        match self.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(EmbedError::invalid_input("text", "text is required")),
        }
    }
}

impl BatchEmbedRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts: Some(texts),
            normalize: default_normalize(),
        }
    }

    /// Whether the caller asked for a unit-length vector
    pub fn wants_normalized(&self) -> bool {
        self.normalize == Some(true)
    }

    /// Validates the request, returning the texts to embed
    ///
    /// Only the list itself is checked. Individual items, including empty
    /// strings, go to the model unchanged.
    pub fn validate(self) -> Result<Vec<String>, EmbedError> {
        match self.texts {
            Some(texts) if !texts.is_empty() => Ok(texts),
            _ => Err(EmbedError::invalid_input("texts", "texts list required")),
        }
    }
}
