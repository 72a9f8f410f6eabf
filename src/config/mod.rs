// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every setting is a command-line flag with an environment variable fallback.
//! Values are read once at start-up; changing the model requires a restart.

use crate::embeddings::{ModelConfig, OnnxOptions};
use clap::{ArgAction, Parser};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Model loaded when `EMBED_MODEL` is not set
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Sentence embedding HTTP service
#[derive(Parser, Debug, Clone)]
#[command(name = "sigma-embed")]
#[command(version)]
#[command(about = "Serve sentence embeddings over HTTP", long_about = None)]
pub struct ServiceConfig {
    /// Embedding model identifier (Hub repository or local directory)
    #[arg(long, env = "EMBED_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory with local models; also holds the Hub download cache
    #[arg(long, env = "EMBED_MODELS_DIR", default_value = "./models")]
    pub models_dir: PathBuf,

    /// Only use local model files, never download
    #[arg(long, env = "EMBED_OFFLINE")]
    pub offline: bool,

    /// Maximum tokens per text, longer input is truncated
    #[arg(long, env = "EMBED_MAX_LENGTH", default_value_t = 256)]
    pub max_length: usize,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "EMBED_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Try the CUDA execution provider before falling back to CPU
    #[arg(long, env = "EMBED_USE_CUDA", default_value_t = true, action = ArgAction::Set)]
    pub use_cuda: bool,

    /// Per-request inference timeout in seconds, 0 disables it
    #[arg(long, env = "EMBED_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    /// Parse from the process arguments and environment
    pub fn from_env() -> Self {
        Self::parse()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model identifier cannot be empty".to_string());
        }
        if self.max_length == 0 {
            return Err("Max length must be greater than 0".to_string());
        }
        if self.intra_threads == 0 {
            return Err("Intra threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_id: self.model.clone(),
            models_dir: self.models_dir.clone(),
            offline: self.offline,
            onnx: OnnxOptions {
                max_length: self.max_length,
                intra_threads: self.intra_threads,
                use_cuda: self.use_cuda,
            },
            timeout: self.inference_timeout(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            models_dir: PathBuf::from("./models"),
            offline: false,
            max_length: 256,
            intra_threads: 4,
            use_cuda: true,
            request_timeout_secs: 30,
        }
    }
}
