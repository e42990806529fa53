//! Ollama HTTP embedding backend

use super::{zero_vector, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dimension of nomic-embed-text vectors; also the size of the fallback
/// zero vector.
pub const OLLAMA_EMBEDDING_DIM: usize = 768;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    max_workers: usize,
    agent: ureq::Agent,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, max_workers: usize, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_workers: max_workers.max(1),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            &config.ollama_url,
            &config.ollama_model,
            config.max_workers,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::to_string(&EmbeddingRequest {
            model: &self.model,
            prompt: text,
        })
        .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => EmbeddingError::Request(format!("HTTP {code} from {url}")),
                ureq::Error::Transport(t) => EmbeddingError::ServiceUnavailable {
                    url: url.clone(),
                    reason: t.to_string(),
                },
            })?;

        let raw = response
            .into_string()
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        let parsed: EmbeddingResponse =
            serde_json::from_str(&raw).map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        Ok(parsed.embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        info!(
            count = texts.len(),
            workers = self.max_workers,
            model = %self.model,
            "Requesting embeddings from Ollama"
        );
        fan_out(texts, self.max_workers, OLLAMA_EMBEDDING_DIM, |index, text| {
            self.embed_one(text)
                .map_err(|e| warn!(chunk = index, error = %e, "Embedding request failed"))
                .ok()
        })
    }

    fn dimension(&self) -> usize {
        OLLAMA_EMBEDDING_DIM
    }

    fn output_suffix(&self) -> &str {
        "ollama"
    }

    fn health_check(&self) -> Result<(), EmbeddingError> {
        let url = format!("{}/api/tags", self.base_url);
        ureq::AgentBuilder::new()
            .timeout(HEALTH_CHECK_TIMEOUT)
            .build()
            .get(&url)
            .call()
            .map(|_| ())
            .map_err(|e| EmbeddingError::ServiceUnavailable {
                url,
                reason: e.to_string(),
            })
    }
}

/// Run `embed` over `texts` on up to `workers` scoped threads.
///
/// Each thread owns a contiguous slice of the input and the matching disjoint
/// slice of the output, so results land in input order without locking.
/// `None` from `embed` becomes a zero vector of `dimension`.
pub(crate) fn fan_out<F>(texts: &[String], workers: usize, dimension: usize, embed: F) -> Vec<Vec<f32>>
where
    F: Fn(usize, &str) -> Option<Vec<f32>> + Sync,
{
    let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
    if texts.is_empty() {
        return vectors;
    }

    let per_worker = texts.len().div_ceil(workers.max(1));
    let completed = AtomicUsize::new(0);
    let total = texts.len();

    std::thread::scope(|scope| {
        for (slice_index, (inputs, outputs)) in texts
            .chunks(per_worker)
            .zip(vectors.chunks_mut(per_worker))
            .enumerate()
        {
            let embed = &embed;
            let completed = &completed;
            scope.spawn(move || {
                let base = slice_index * per_worker;
                for (offset, (text, slot)) in inputs.iter().zip(outputs.iter_mut()).enumerate() {
                    *slot = embed(base + offset, text).unwrap_or_else(|| zero_vector(dimension));
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 5 == 0 || done == total {
                        debug!(done, total, "Embedding progress");
                    }
                }
            });
        }
    });

    vectors
}
