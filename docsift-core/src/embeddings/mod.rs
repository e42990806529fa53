//! Embedding collaborators
//!
//! The chunking stage only needs "given a list of strings, return a list of
//! fixed-length vectors". Individual failures never abort a batch: the
//! affected text gets a zero vector of the backend's dimension.

pub mod ollama;
#[cfg(feature = "onnx-embeddings")]
pub mod onnx;

pub use ollama::OllamaEmbedder;
#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxSentenceEmbedder;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::EmbeddingError;

/// Dimension used by sentence-transformer models such as all-MiniLM-L6-v2.
pub const SENTENCE_TRANSFORMER_DIM: usize = 384;

/// Turns chunk texts into vectors.
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order. Never fails; failed texts get
    /// `zero_vector(self.dimension())`.
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;

    fn dimension(&self) -> usize;

    /// Tag used in output file names (`<stem>_vectorized_<suffix>.json`)
    fn output_suffix(&self) -> &str;

    /// Verify the backend can serve requests before a batch starts
    fn health_check(&self) -> Result<(), EmbeddingError>;
}

pub fn zero_vector(dimension: usize) -> Vec<f32> {
    vec![0.0; dimension]
}

/// Build the embedder selected by config.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Ollama => Ok(Box::new(OllamaEmbedder::from_config(config))),
        EmbeddingBackend::SentenceTransformer => create_sentence_transformer(config),
    }
}

#[cfg(feature = "onnx-embeddings")]
fn create_sentence_transformer(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let model_dir = std::path::Path::new(&config.models_folder).join(&config.sentence_transformer_model);
    Ok(Box::new(OnnxSentenceEmbedder::load(&model_dir)?))
}

#[cfg(not(feature = "onnx-embeddings"))]
fn create_sentence_transformer(_config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    Err(EmbeddingError::BackendNotCompiled(
        "sentence_transformer (enable the `onnx-embeddings` feature)".to_string(),
    ))
}

/// Embedder producing deterministic unit vectors, for tests and dry runs.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(SENTENCE_TRANSFORMER_DIM)
    }
}

impl Embedder for MockEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|t| deterministic_vector(t, self.dimension))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn output_suffix(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

fn deterministic_vector(text: &str, dimension: usize) -> Vec<f32> {
    let bytes = text.as_bytes();
    let mut vector: Vec<f32> = (0..dimension)
        .map(|i| {
            let byte = bytes.get(i % bytes.len().max(1)).copied().unwrap_or(0);
            (byte as f32 + i as f32) / 255.0
        })
        .collect();
    l2_normalize(&mut vector);
    vector
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_vectors_are_deterministic_unit_vectors() {
        let embedder = MockEmbedder::new(16);
        let texts = vec!["same text".to_string(), "other".to_string(), "same text".to_string()];
        let vectors = embedder.embed_batch(&texts);
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
        let norm: f32 = vectors[1].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_has_requested_dimension() {
        assert_eq!(zero_vector(768).len(), 768);
        assert!(zero_vector(4).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0; 3];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 3]);
    }

    #[cfg(not(feature = "onnx-embeddings"))]
    #[test]
    fn sentence_transformer_requires_feature() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::SentenceTransformer,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(EmbeddingError::BackendNotCompiled(_))
        ));
    }

    #[test]
    fn ollama_is_the_default_backend() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.output_suffix(), "ollama");
        assert_eq!(embedder.dimension(), 768);
    }
}
