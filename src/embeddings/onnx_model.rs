// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Embedding Model Wrapper
//!
//! This module provides a wrapper around ONNX Runtime for running
//! sentence transformer models exported to ONNX (all-MiniLM-L6-v2 by default).
//!
//! Features:
//! - ONNX model loading from disk
//! - GPU acceleration via CUDA (with automatic CPU fallback)
//! - BERT tokenization with truncation, batch padding done here
//! - Mean pooling over token embeddings weighted by the attention mask
//! - Output dimension discovered from the model at load time

use super::{normalize_rows, EmbedError, EmbeddingVector, ModelSource, TextEncoder};
use anyhow::{anyhow, Context, Result};
use ndarray::{Array2, ArrayViewD, Axis};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::{info, warn};

const PROBE_TEXT: &str = "validation test";

/// Runtime options for the ONNX session and tokenizer
#[derive(Debug, Clone)]
pub struct OnnxOptions {
    /// Maximum tokens per text; longer input is truncated
    pub max_length: usize,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Try the CUDA execution provider before the CPU one
    pub use_cuda: bool,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            max_length: 256,
            intra_threads: 4,
            use_cuda: true,
        }
    }
}

/// ONNX-based sentence embedding model
///
/// # Thread Safety
/// ONNX Runtime sessions need exclusive access to run, so the session sits
/// behind a mutex; the tokenizer is shared freely.
pub struct OnnxEmbeddingModel {
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    /// Whether the graph declares a `token_type_ids` input
    uses_token_type_ids: bool,

    /// Whether the model pipeline ends with L2 normalization
    normalize_output: bool,

    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("dimension", &self.dimension)
            .field("uses_token_type_ids", &self.uses_token_type_ids)
            .field("normalize_output", &self.normalize_output)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Loads the ONNX graph and tokenizer described by `source`
    ///
    /// Runs one probe inference to learn the output dimension. Blocking: call
    /// it from a blocking context.
    ///
    /// # Errors
    /// Returns error if:
    /// - Model or tokenizer file is missing or invalid
    /// - ONNX Runtime initialization fails
    /// - The probe inference fails or yields an unusable shape
    pub fn load(source: &ModelSource, options: &OnnxOptions) -> Result<Self> {
        let model_path = source.model_path.as_path();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !source.tokenizer_path.exists() {
            anyhow::bail!(
                "Tokenizer file not found: {}",
                source.tokenizer_path.display()
            );
        }

        let session = if options.use_cuda {
            info!("Attempting CUDA execution provider...");
            match build_session(model_path, true, options.intra_threads) {
                Ok(session) => {
                    info!("CUDA execution provider initialized");
                    session
                }
                Err(e) => {
                    warn!("CUDA execution provider failed: {:#}", e);
                    warn!("Falling back to CPU execution provider");
                    build_session(model_path, false, options.intra_threads)?
                }
            }
        } else {
            build_session(model_path, false, options.intra_threads)?
        };

        let uses_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&source.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let mut model = Self {
            session: Mutex::new(session),
            tokenizer,
            uses_token_type_ids,
            normalize_output: source.normalizes_output(),
            dimension: 0,
        };

        let probe = model
            .embed_all(&[PROBE_TEXT])
            .context("Probe inference failed")?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            anyhow::bail!("Model produced an empty embedding for the probe text");
        }
        model.dimension = dimension;

        info!(
            "ONNX embedding model loaded: {} ({} dimensions, normalize_output={})",
            model_path.display(),
            dimension,
            model.normalize_output
        );

        Ok(model)
    }

    /// Tokenizes, runs inference and pools a batch of texts
    fn embed_all(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<Encoding>>>()?;

        let mut embeddings = self.infer(&encodings)?;

        if self.normalize_output {
            normalize_rows(&mut embeddings);
        }

        Ok(embeddings)
    }

    fn infer(&self, encodings: &[Encoding]) -> Result<Vec<EmbeddingVector>> {
        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len())
            .max()
            .unwrap_or(0);

        // Pad every sequence to the longest one in the batch
        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);
        for encoding in encodings {
            let ids = encoding.get_ids();
            let padding = max_len - ids.len();

            input_ids.extend(ids.iter().map(|&id| id as i64));
            input_ids.extend(std::iter::repeat(0i64).take(padding));

            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
            attention_mask.extend(std::iter::repeat(0i64).take(padding));
        }

        let input_ids_array = Array2::from_shape_vec((batch_size, max_len), input_ids)
            .context("Failed to create input_ids array")?;
        let attention_mask_array =
            Array2::from_shape_vec((batch_size, max_len), attention_mask.clone())
                .context("Failed to create attention_mask array")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session lock poisoned"))?;

        let outputs = if self.uses_token_type_ids {
            let token_type_ids_array = Array2::<i64>::zeros((batch_size, max_len));
            session.run(ort::inputs![
                "input_ids" => Value::from_array(input_ids_array)?,
                "attention_mask" => Value::from_array(attention_mask_array)?,
                "token_type_ids" => Value::from_array(token_type_ids_array)?
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => Value::from_array(input_ids_array)?,
                "attention_mask" => Value::from_array(attention_mask_array)?
            ])?
        };

        // Output names differ between exports, the embedding output comes first
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        pool_output(&output, &attention_mask, batch_size, max_len)
    }

    /// Returns the output dimension of this model
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl TextEncoder for OnnxEmbeddingModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<EmbeddingVector, EmbedError> {
        self.embed_all(&[text])
            .and_then(|mut rows| rows.pop().ok_or_else(|| anyhow!("Model returned no embedding")))
            .map_err(|e| EmbedError::inference(format!("{:#}", e)))
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed_all(&texts)
            .map_err(|e| EmbedError::inference(format!("{:#}", e)))
    }
}

fn build_session(model_path: &Path, cuda: bool, intra_threads: usize) -> Result<Session> {
    let builder = Session::builder().context("Failed to create session builder")?;

    let builder = if cuda {
        builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
    } else {
        builder
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
    };

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))
}

/// Turns the first model output into one sentence vector per batch item
///
/// `[batch, seq_len, hidden]` token embeddings are mean pooled with the
/// attention mask; `[batch, hidden]` output is already pooled.
fn pool_output(
    output: &ArrayViewD<'_, f32>,
    attention_mask: &[i64],
    batch_size: usize,
    seq_len: usize,
) -> Result<Vec<EmbeddingVector>> {
    let shape = output.shape();
    if shape.first() != Some(&batch_size) {
        anyhow::bail!(
            "Model output batch dimension mismatch: {:?} (expected {} items)",
            shape,
            batch_size
        );
    }

    match output.ndim() {
        3 => Ok((0..batch_size)
            .map(|b| {
                let tokens = output.index_axis(Axis(0), b);
                let mask = &attention_mask[b * seq_len..(b + 1) * seq_len];
                mean_pool(&tokens, mask)
            })
            .collect()),
        2 => Ok((0..batch_size)
            .map(|b| output.index_axis(Axis(0), b).iter().copied().collect())
            .collect()),
        _ => anyhow::bail!(
            "Model outputs unexpected dimensions: {:?} \
             (expected [batch, seq_len, hidden] or [batch, hidden])",
            shape
        ),
    }
}

fn mean_pool(tokens: &ArrayViewD<'_, f32>, mask: &[i64]) -> EmbeddingVector {
    let seq_len = tokens.shape()[0].min(mask.len());
    let hidden_dim = tokens.shape()[1];

    let mut pooled = vec![0.0f32; hidden_dim];
    let mut sum_mask = 0.0f32;

    for (i, &m) in mask.iter().enumerate().take(seq_len) {
        if m == 0 {
            continue;
        }
        let weight = m as f32;
        sum_mask += weight;
        for (j, value) in pooled.iter_mut().enumerate() {
            *value += tokens[[i, j]] * weight;
        }
    }

    for value in &mut pooled {
        *value /= sum_mask.max(1e-9);
    }

    pooled
}
