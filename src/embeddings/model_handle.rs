// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide embedding model handle
//!
//! Built once at start-up from the configured model identifier and shared by
//! every request handler through `Arc`. Nothing in the handle is mutated after
//! construction; inference runs on tokio's blocking pool so a slow batch never
//! stalls the async workers serving other connections.

use super::{
    EmbedError, EmbeddingVector, ModelSource, OnnxEmbeddingModel, OnnxOptions, TextEncoder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Inference calls allowed on the blocking pool at once
///
/// The ONNX session runs one call at a time, so extra slots would only park
/// blocking threads on the session lock.
const INFERENCE_SLOTS: usize = 1;

/// Configuration for loading the embedding model
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier (Hub repository, local directory, or models-dir entry)
    pub model_id: String,
    /// Directory holding local models and the Hub download cache
    pub models_dir: PathBuf,
    /// Never reach out to the Hub
    pub offline: bool,
    pub onnx: OnnxOptions,
    /// Upper bound on a single inference call
    pub timeout: Option<Duration>,
}

/// Read-only handle to the loaded model
///
/// # Example
/// ```ignore
/// let handle = ModelHandle::load(&config).await?;
/// let vector = handle.encode("Hello world".to_string()).await?;
/// assert_eq!(vector.len(), handle.dimension());
/// ```
#[derive(Clone)]
pub struct ModelHandle {
    model_id: String,
    encoder: Arc<dyn TextEncoder>,
    dimension: usize,
    timeout: Option<Duration>,
    slots: Arc<Semaphore>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    /// Resolves and loads the configured model
    ///
    /// # Errors
    /// `EmbedError::ModelLoad` if the identifier cannot be resolved, the files
    /// cannot be fetched, or ONNX Runtime fails to initialize the model.
    pub async fn load(config: &ModelConfig) -> Result<Self, EmbedError> {
        info!("Loading embedding model: {}", config.model_id);

        let source =
            ModelSource::resolve(&config.model_id, &config.models_dir, config.offline).await?;
        info!("   Model file:     {}", source.model_path.display());
        info!("   Tokenizer file: {}", source.tokenizer_path.display());

        let options = config.onnx.clone();
        let model_id = config.model_id.clone();
        let model = tokio::task::spawn_blocking(move || OnnxEmbeddingModel::load(&source, &options))
            .await
            .map_err(|e| EmbedError::model_load(&model_id, e))?
            .map_err(|e| EmbedError::model_load(&model_id, format!("{:#}", e)))?;

        info!(
            "Embedding model ready: {} ({} dimensions)",
            config.model_id,
            model.dimension()
        );

        Ok(Self::from_encoder(
            config.model_id.clone(),
            Arc::new(model),
            config.timeout,
        ))
    }

    /// Wraps an already constructed encoder
    pub fn from_encoder(
        model_id: impl Into<String>,
        encoder: Arc<dyn TextEncoder>,
        timeout: Option<Duration>,
    ) -> Self {
        let dimension = encoder.dimension();
        Self {
            model_id: model_id.into(),
            encoder,
            dimension,
            timeout,
            slots: Arc::new(Semaphore::new(INFERENCE_SLOTS)),
        }
    }

    /// Configured model identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Output vector length, constant for the process
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encodes one text
    pub async fn encode(&self, text: String) -> Result<EmbeddingVector, EmbedError> {
        let encoder = Arc::clone(&self.encoder);
        let vector = self.run_blocking(move || encoder.encode(&text)).await?;

        self.check_dimension(&vector, 0)?;
        Ok(vector)
    }

    /// Encodes texts one-to-one, preserving input order
    pub async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let expected = texts.len();
        let encoder = Arc::clone(&self.encoder);
        let vectors = self.run_blocking(move || encoder.encode_batch(&texts)).await?;

        if vectors.len() != expected {
            return Err(EmbedError::inference(format!(
                "model returned {} embeddings for {} texts",
                vectors.len(),
                expected
            )));
        }
        for (index, vector) in vectors.iter().enumerate() {
            self.check_dimension(vector, index)?;
        }

        Ok(vectors)
    }

    /// Runs `job` on the blocking pool once an inference slot is free
    ///
    /// The timeout covers both the wait for a slot and the job itself. A
    /// request that times out while queued never starts. A job that is
    /// already running keeps its slot until it returns, so abandoned work
    /// never stacks up behind the session.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, EmbedError>
    where
        F: FnOnce() -> Result<T, EmbedError> + Send + 'static,
        T: Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let run = async move {
            let permit = slots
                .acquire_owned()
                .await
                .map_err(|e| EmbedError::inference(format!("inference slots closed: {}", e)))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| EmbedError::inference(format!("inference task failed: {}", e)))?
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                warn!("Inference exceeded {:?}, abandoning request", limit);
                EmbedError::Timeout(limit)
            })?,
            None => run.await,
        }
    }

    fn check_dimension(&self, vector: &[f32], index: usize) -> Result<(), EmbedError> {
        if vector.len() != self.dimension {
            debug!(
                "Embedding {} has {} dimensions, expected {}",
                index,
                vector.len(),
                self.dimension
            );
            return Err(EmbedError::inference(format!(
                "unexpected embedding dimension at index {}: {} (expected {})",
                index,
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}
