// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! L2 (unit-norm) normalization of embedding vectors
//!
//! A vector whose norm is zero is left untouched instead of being divided,
//! so degenerate model output never turns into NaNs.

/// Euclidean norm of a vector, accumulated in f64
pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&x| (x as f64) * (x as f64))
        .sum::<f64>()
        .sqrt()
}

/// Rescales `vector` to unit length in place
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value = (*value as f64 / norm) as f32;
        }
    }
}

/// Normalizes every row independently
pub fn normalize_rows(rows: &mut [Vec<f32>]) {
    for row in rows.iter_mut() {
        normalize_in_place(row);
    }
}
