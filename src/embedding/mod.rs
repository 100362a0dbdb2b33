//! Text embedding generation.
//!
//! The pipeline consumes embeddings through the [`EmbeddingProvider`]
//! trait so the clustering core can run against a deterministic stub in
//! tests. The production implementation, [`FastEmbedProvider`], uses
//! FastEmbed (ONNX-based, local inference) with a small LRU cache, the
//! model chosen by name.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Cache capacity in entries; opinion texts are short, so this is cheap.
const CACHE_SIZE: usize = 1024;

/// An external capability mapping text batches to fixed-dimension vectors.
///
/// Contract: one vector per input string, in input order, with constant
/// dimensionality for a given model and no cross-batch state. Identical
/// text must yield identical vectors within a run.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the underlying model.
    fn model_name(&self) -> &str;
}

/// FastEmbed-backed embedding provider.
pub struct FastEmbedProvider {
    model: Arc<RwLock<TextEmbedding>>,
    cache: Arc<RwLock<LruCache<String, Vec<f32>>>>,
    model_name: String,
}

impl FastEmbedProvider {
    /// Initialize the model named by `model_name`.
    ///
    /// Model loading is blocking (ONNX session setup), so it runs on the
    /// blocking pool.
    pub async fn new(model_name: &str) -> Result<Self> {
        let embedding_model = resolve_model(model_name)?;
        info!("loading embedding model {model_name}");

        let init_options = InitOptions::new(embedding_model);
        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(init_options))
            .await
            .map_err(|e| PipelineError::Embedding(format!("model init task failed: {e}")))?
            .map_err(|e| PipelineError::Embedding(format!("failed to load model: {e}")))?;

        let cache = LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN));

        Ok(Self {
            model: Arc::new(RwLock::new(model)),
            cache: Arc::new(RwLock::new(cache)),
            model_name: model_name.to_string(),
        })
    }
}

/// Map a configured model name to a FastEmbed model.
fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(PipelineError::InvalidParameter {
            name: "model_name",
            message: format!("unknown embedding model '{other}'"),
        }),
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        let mut to_embed: Vec<String> = Vec::new();
        let mut to_embed_indices: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.write().await;
            for (i, text) in texts.iter().enumerate() {
                if let Some(hit) = cache.get(text) {
                    results[i] = hit.clone();
                } else {
                    to_embed.push(text.clone());
                    to_embed_indices.push(i);
                }
            }
        }

        if !to_embed.is_empty() {
            let model = self.model.clone();
            let batch = to_embed.clone();
            let embedded = tokio::task::spawn_blocking(move || {
                let guard = futures::executor::block_on(model.read());
                guard.embed(batch, None)
            })
            .await
            .map_err(|e| PipelineError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

            if embedded.len() != to_embed.len() {
                return Err(PipelineError::Embedding(format!(
                    "backend returned {} vectors for {} inputs",
                    embedded.len(),
                    to_embed.len()
                )));
            }

            let mut cache = self.cache.write().await;
            for ((text, idx), vector) in to_embed
                .iter()
                .zip(to_embed_indices.iter().copied())
                .zip(embedded)
            {
                cache.put(text.clone(), vector.clone());
                results[idx] = vector;
            }
        }

        Ok(results)
    }
}
