// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model identifier resolution
//!
//! A model identifier resolves, in order, to:
//! 1. a directory path holding the ONNX graph and `tokenizer.json`
//! 2. a subdirectory of the models directory named after the identifier
//!    (`all-MiniLM-L6-v2` or `sentence-transformers--all-MiniLM-L6-v2`)
//! 3. a HuggingFace Hub repository, downloaded into the models directory cache

use super::EmbedError;
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ONNX_CANDIDATES: &[&str] = &["onnx/model.onnx", "model.onnx"];
const TOKENIZER_FILE: &str = "tokenizer.json";
const MODULES_FILE: &str = "modules.json";
const HUB_CACHE_SUBDIR: &str = "hub";

/// Files backing one embedding model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// sentence-transformers pipeline description, when shipped with the model
    pub modules_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PipelineModule {
    #[serde(rename = "type")]
    kind: String,
}

impl ModelSource {
    /// Resolves a model identifier to local files, downloading when allowed
    pub async fn resolve(
        model_id: &str,
        models_dir: &Path,
        offline: bool,
    ) -> Result<Self, EmbedError> {
        if let Some(source) = Self::find_local(model_id, models_dir) {
            info!("Using local model files for {}: {}", model_id, source.model_path.display());
            return Ok(source);
        }

        if offline {
            return Err(EmbedError::model_load(
                model_id,
                format!(
                    "no local model files found under {} and downloads are disabled",
                    models_dir.display()
                ),
            ));
        }

        Self::download(model_id, models_dir).await
    }

    /// Looks for model files on disk without touching the network
    pub fn find_local(model_id: &str, models_dir: &Path) -> Option<Self> {
        let candidates = [
            PathBuf::from(model_id),
            models_dir.join(short_name(model_id)),
            models_dir.join(model_id.replace('/', "--")),
        ];

        candidates
            .iter()
            .filter(|dir| dir.is_dir())
            .find_map(|dir| Self::from_dir(dir))
    }

    /// Builds a source from a directory laid out like a model repository
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let model_path = ONNX_CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())?;

        let tokenizer_path = dir.join(TOKENIZER_FILE);
        if !tokenizer_path.is_file() {
            debug!("{} has an ONNX graph but no tokenizer.json", dir.display());
            return None;
        }

        let modules_path = Some(dir.join(MODULES_FILE)).filter(|path| path.is_file());

        Some(Self {
            model_path,
            tokenizer_path,
            modules_path,
        })
    }

    async fn download(model_id: &str, models_dir: &Path) -> Result<Self, EmbedError> {
        info!("Fetching {} from the HuggingFace Hub", model_id);

        let api = ApiBuilder::new()
            .with_progress(false)
            .with_cache_dir(models_dir.join(HUB_CACHE_SUBDIR))
            .build()
            .map_err(|e| EmbedError::model_load(model_id, e))?;
        let repo = api.model(model_id.to_string());

        let model_path = fetch_first(&repo, ONNX_CANDIDATES)
            .await
            .ok_or_else(|| EmbedError::model_load(model_id, "repository has no ONNX export"))?;

        let tokenizer_path = repo
            .get(TOKENIZER_FILE)
            .await
            .map_err(|e| EmbedError::model_load(model_id, e))?;

        let modules_path = repo.get(MODULES_FILE).await.ok();

        Ok(Self {
            model_path,
            tokenizer_path,
            modules_path,
        })
    }

    /// Whether the sentence-transformers pipeline ends with a Normalize module
    pub fn normalizes_output(&self) -> bool {
        let Some(path) = &self.modules_path else {
            return false;
        };

        let modules: Vec<PipelineModule> = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
        {
            Ok(modules) => modules,
            Err(e) => {
                debug!("Ignoring unreadable {}: {}", path.display(), e);
                return false;
            }
        };

        modules.iter().any(|m| m.kind.ends_with(".Normalize"))
    }
}

async fn fetch_first(repo: &ApiRepo, candidates: &[&str]) -> Option<PathBuf> {
    for candidate in candidates {
        match repo.get(candidate).await {
            Ok(path) => return Some(path),
            Err(e) => debug!("{} not available: {}", candidate, e),
        }
    }
    None
}

fn short_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}
