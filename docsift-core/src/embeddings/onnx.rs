//! Local sentence-transformer embeddings via ONNX Runtime.
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`
//! (e.g. an all-MiniLM-L6-v2 export). Token embeddings are mean-pooled under
//! the attention mask and L2-normalized.

use super::{l2_normalize, zero_vector, Embedder, SENTENCE_TRANSFORMER_DIM};
use crate::error::EmbeddingError;
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// `Session::run` takes `&mut self`, hence the mutex behind the `&self` trait.
pub struct OnnxSentenceEmbedder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl OnnxSentenceEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(model_path));
        }
        if !tokenizer_path.exists() {
            return Err(EmbeddingError::ModelNotFound(tokenizer_path));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::ModelInit(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| EmbeddingError::ModelInit(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::ModelInit(format!("ONNX load failed: {e}")))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::ModelInit(format!("Tokenizer load failed: {e}")))?;

        info!(model = %model_dir.display(), "Sentence-transformer model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        use ort::value::TensorRef;

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Request(format!("Tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();

        let tensor = |values: Vec<i64>| {
            ndarray::Array2::from_shape_vec((1, seq_len), values)
                .map_err(|e| EmbeddingError::Request(e.to_string()))
        };
        let ids = tensor(input_ids)?;
        let mask = tensor(attention_mask.clone())?;
        let types = tensor(token_type_ids)?;

        let ids = TensorRef::from_array_view(&ids).map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let mask = TensorRef::from_array_view(&mask).map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let types = TensorRef::from_array_view(&types).map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Request("Session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![ids, mask, types])
            .map_err(|e| EmbeddingError::Request(format!("ONNX inference failed: {e}")))?;

        // [1, seq_len, dim]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        if shape.len() != 3 || shape[2] as usize != SENTENCE_TRANSFORMER_DIM {
            return Err(EmbeddingError::MalformedResponse(format!(
                "Unexpected output shape {shape:?}, expected [1, {seq_len}, {SENTENCE_TRANSFORMER_DIM}]"
            )));
        }

        Ok(mean_pool(data, &attention_mask, SENTENCE_TRANSFORMER_DIM))
    }
}

/// Average the token vectors where the mask is set, then L2-normalize.
fn mean_pool(token_vectors: &[f32], attention_mask: &[i64], dimension: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dimension];
    let mut mask_sum = 0.0f32;

    for (token, &mask) in attention_mask.iter().enumerate() {
        let weight = mask as f32;
        mask_sum += weight;
        let offset = token * dimension;
        for (dim, value) in pooled.iter_mut().enumerate() {
            *value += token_vectors[offset + dim] * weight;
        }
    }
    if mask_sum > 0.0 {
        for value in &mut pooled {
            *value /= mask_sum;
        }
    }
    l2_normalize(&mut pooled);
    pooled
}

impl Embedder for OnnxSentenceEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let vectors: Result<Vec<Vec<f32>>, EmbeddingError> = texts.iter().map(|t| self.infer(t)).collect();
        vectors.unwrap_or_else(|e| {
            warn!(error = %e, count = texts.len(), "Sentence-transformer batch failed; using zero vectors");
            texts.iter().map(|_| zero_vector(SENTENCE_TRANSFORMER_DIM)).collect()
        })
    }

    fn dimension(&self) -> usize {
        SENTENCE_TRANSFORMER_DIM
    }

    fn output_suffix(&self) -> &str {
        "st"
    }

    fn health_check(&self) -> Result<(), EmbeddingError> {
        self.infer("health check").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        match OnnxSentenceEmbedder::load(dir.path()) {
            Err(EmbeddingError::ModelNotFound(path)) => assert!(path.ends_with("model.onnx")),
            _ => panic!("expected ModelNotFound"),
        }
    }

    #[test]
    fn mean_pool_ignores_masked_tokens() {
        let tokens = [1.0, 0.0, 3.0, 0.0, 100.0, 100.0];
        let pooled = mean_pool(&tokens, &[1, 1, 0], 2);
        assert!((pooled[0] - 1.0).abs() < 1e-6);
        assert!(pooled[1].abs() < 1e-6);
    }
}
