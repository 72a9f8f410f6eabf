// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response bodies for the embedding endpoints

use crate::embeddings::EmbeddingVector;
use serde::{Deserialize, Serialize};

/// Response body for POST /embed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleEmbedResponse {
    pub embedding: EmbeddingVector,
}

/// Response body for POST /embed/batch, one row per input text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchEmbedResponse {
    pub embeddings: Vec<EmbeddingVector>,
}
