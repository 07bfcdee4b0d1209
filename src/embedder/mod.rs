//! Embedder trait and shared types for text embedding.
pub mod download;
pub mod hash;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::config::{EmbedderBackend, ModelConfig};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("expected {expected}-dimensional vectors, model produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("requested {requested} embeddings, got {returned}")]
    CountMismatch { requested: usize, returned: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, one per input, in order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Identifier recorded next to persisted vectors; queries must use the
    /// same model that produced them.
    fn model_name(&self) -> &str;
}

/// Build the embedder selected by `model`, downloading ONNX model files
/// on first use.
pub fn from_config(model: &ModelConfig) -> Result<Arc<dyn Embedder>> {
    match model.backend {
        EmbedderBackend::Hash => {
            info!("Using hash embedder ({} dimensions)", model.dimensions);
            Ok(Arc::new(hash::HashEmbedder::new(model.dimensions)))
        }
        EmbedderBackend::Onnx => {
            let model_dir = Path::new(&model.model_dir);
            download::download_model_files(model_dir)?;
            let embedder = onnx::OnnxEmbedder::new(model_dir, &model.name, model.dimensions)
                .context("failed to initialise ONNX embedder")?;
            Ok(Arc::new(embedder))
        }
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return;
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    for v in vec {
        *v *= inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_config_hash_backend() {
        let model = ModelConfig {
            backend: EmbedderBackend::Hash,
            dimensions: 32,
            ..ModelConfig::default()
        };
        let embedder = from_config(&model).unwrap();
        assert_eq!(embedder.dimensions(), 32);
        assert_eq!(embedder.model_name(), "hash-32");
    }
}
