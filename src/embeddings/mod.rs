//! Text embedding generation backing background message embedding and the
//! Memory Composer's semantic recall (§3, §4.4).
//!
//! Trimmed from the teacher's 30+-model catalog to a single default model:
//! the orchestrator only ever needs one embedding space (messages and
//! recall queries must be comparable), so there is no per-request model
//! choice to expose.

use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;

use crate::types::{OrchestratorError, Result};

pub use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

/// `BAAI/bge-base-en-v1.5`, 768 dimensions — matches the embedding width
/// used throughout the data model and `db::turso`'s stored vectors.
pub const EMBEDDING_DIMENSIONS: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_show_progress")]
    pub show_download_progress: bool,
}

fn default_batch_size() -> usize {
    32
}

fn default_show_progress() -> bool {
    false
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            show_download_progress: default_show_progress(),
        }
    }
}

/// Generates text embeddings via `spawn_blocking`, so fastembed's
/// synchronous ONNX inference never blocks the async runtime.
pub struct EmbeddingService {
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EmbeddingConfig::default())
    }

    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    /// Embed a single piece of text (e.g. a semantic recall query).
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_texts(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::EmbeddingFailed("no embedding produced".into()))
    }

    /// Embed many texts in one batch (e.g. backfilling history on startup).
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts_owned = texts.to_vec();
        let batch_size = self.config.batch_size;
        let show_progress = self.config.show_download_progress;

        spawn_blocking(move || {
            let mut model = TextEmbedding::try_new(
                InitOptions::new(FastEmbedModel::BGEBaseENV15).with_show_download_progress(show_progress),
            )
            .map_err(|e| OrchestratorError::EmbeddingFailed(format!("model init: {e}")))?;

            let refs: Vec<&str> = texts_owned.iter().map(|s| s.as_str()).collect();
            model
                .embed(refs, Some(batch_size))
                .map_err(|e| OrchestratorError::EmbeddingFailed(e.to_string()))
        })
        .await
        .map_err(|e| OrchestratorError::EmbeddingFailed(format!("blocking task panicked: {e}")))?
    }
}
