// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic hash-seeded encoder
//!
//! Produces stable pseudo-random vectors without a model on disk. Used by the
//! test suite and benchmarks in place of ONNX inference.

use super::{EmbedError, TextEncoder};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct HashEncoder {
    dimension: usize,
}

impl HashEncoder {
    pub fn new(dimension: usize) -> Result<Self, EmbedError> {
        if dimension == 0 {
            return Err(EmbedError::model_load(
                "hash",
                "embedding dimension must be greater than 0",
            ));
        }
        Ok(Self { dimension })
    }
}

impl TextEncoder for HashEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            // LCG step mixed with the position
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407)
                ^ (i as u64);

            // Map to [-1, 1]
            let value = (state as f64 / u64::MAX as f64) * 2.0 - 1.0;
            embedding.push(value as f32);
        }

        Ok(embedding)
    }
}
