use crate::chunker::{ChunkWindow, DEFAULT_OVERLAP, DEFAULT_WINDOW_SIZE};
use crate::cleaning::TextCleaner;
use crate::error::{ChunkError, ConfigError};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_render_dpi() -> u32 {
    300
}

fn default_min_image_px() -> u32 {
    10
}

fn default_min_embedded_image_px() -> u32 {
    50
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_ollama_model() -> String {
    "nomic-embed-text:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_sentence_transformer_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_models_folder() -> String {
    "./models".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_data_folder() -> String {
    "./data".to_string()
}

fn default_extracted_folder() -> String {
    "./output/ocr_output".to_string()
}

fn default_chunks_folder() -> String {
    "./output/vectorized_chunks".to_string()
}

fn default_qa_folder() -> String {
    "./output/qa_pairs".to_string()
}

fn default_cleaned_qa_folder() -> String {
    "./output/cleaned_json_output".to_string()
}

/// Full pipeline configuration, loadable from YAML and overridable from the
/// environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Debug-level logging in the CLI
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Run the text cleaner over extracted text before persisting it
    #[serde(default = "default_true")]
    pub clean_text: bool,
    /// Organisation watermark to strip, e.g. `BAYANAT\s+\(?\d{4}\)?`
    #[serde(default)]
    pub watermark_pattern: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            clean_text: true,
            watermark_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit tesseract binary; auto-detected when absent
    #[serde(default)]
    pub tesseract_path: Option<String>,
    /// Resolution used when rasterizing PDF pages for OCR
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    /// Images narrower or shorter than this are never sent to the engine
    #[serde(default = "default_min_image_px")]
    pub min_image_px: u32,
    /// Embedded DOCX/PPTX pictures smaller than this are skipped
    #[serde(default = "default_min_embedded_image_px")]
    pub min_embedded_image_px: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tesseract_path: None,
            render_dpi: default_render_dpi(),
            min_image_px: default_min_image_px(),
            min_embedded_image_px: default_min_embedded_image_px(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Words per chunk
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Words shared by consecutive chunks
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Ollama,
    SentenceTransformer,
}

impl EmbeddingBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(EmbeddingBackend::Ollama),
            "sentence_transformer" | "sentence-transformer" | "st" => {
                Some(EmbeddingBackend::SentenceTransformer)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_sentence_transformer_model")]
    pub sentence_transformer_model: String,
    /// Directory holding `<model>/model.onnx` and `<model>/tokenizer.json`
    #[serde(default = "default_models_folder")]
    pub models_folder: String,
    /// Concurrent requests against the embedding service
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            ollama_model: default_ollama_model(),
            ollama_url: default_ollama_url(),
            sentence_transformer_model: default_sentence_transformer_model(),
            models_folder: default_models_folder(),
            max_workers: default_max_workers(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_folder")]
    pub data_folder: String,
    #[serde(default = "default_extracted_folder")]
    pub extracted_folder: String,
    /// Where the chunker reads `.txt` files; defaults to `extracted_folder`
    #[serde(default)]
    pub chunk_input_folder: Option<String>,
    #[serde(default = "default_chunks_folder")]
    pub chunks_folder: String,
    #[serde(default = "default_qa_folder")]
    pub qa_folder: String,
    #[serde(default = "default_cleaned_qa_folder")]
    pub cleaned_qa_folder: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            extracted_folder: default_extracted_folder(),
            chunk_input_folder: None,
            chunks_folder: default_chunks_folder(),
            qa_folder: default_qa_folder(),
            cleaned_qa_folder: default_cleaned_qa_folder(),
        }
    }
}

impl PathsConfig {
    pub fn chunk_input(&self) -> &str {
        self.chunk_input_folder
            .as_deref()
            .unwrap_or(&self.extracted_folder)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache root; the platform cache directory when absent
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .map(|d| d.join("docsift"))
                .unwrap_or_else(|| PathBuf::from("cache")),
        }
    }
}

impl PipelineConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                tracing::warn!(path = p, error = %e, "Failed to load config, using defaults");
                eprintln!("⚠️  Failed to load config from {}, using defaults", p);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Overlay settings from environment-style key/value lookups.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLEAN_EXTRACTED_TEXT") {
            self.extraction.clean_text = parse_flag(&v);
        }
        if let Some(v) = lookup("WATERMARK_PATTERN") {
            self.extraction.watermark_pattern = Some(v).filter(|p| !p.trim().is_empty());
        }
        if let Some(v) = lookup("OCR_ENABLED") {
            self.ocr.enabled = parse_flag(&v);
        }
        if let Some(v) = lookup("TESSERACT_PATH") {
            self.ocr.tesseract_path = Some(v).filter(|p| !p.trim().is_empty());
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.window_size = parse_number("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunking.overlap = parse_number("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("EMBEDDING_TYPE") {
            self.embedding.backend =
                EmbeddingBackend::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                    key: "EMBEDDING_TYPE".to_string(),
                    value: v.clone(),
                    reason: "expected 'ollama' or 'sentence_transformer'".to_string(),
                })?;
        }
        // CHUNKED_MODEL_NAME is the older spelling; OLLAMA_MODEL_NAME wins
        if let Some(v) = lookup("OLLAMA_MODEL_NAME").or_else(|| lookup("CHUNKED_MODEL_NAME")) {
            self.embedding.ollama_model = v;
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.embedding.ollama_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("SENTENCE_TRANSFORMER_MODEL") {
            self.embedding.sentence_transformer_model = v;
        }
        if let Some(v) = lookup("MODELS_FOLDER_PATH") {
            self.embedding.models_folder = v;
        }
        if let Some(v) = lookup("MAX_WORKERS") {
            self.embedding.max_workers = parse_number("MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("DATA_FOLDER_PATH") {
            self.paths.data_folder = v;
        }
        if let Some(v) = lookup("OCR_OUTPUT_FOLDER_PATH") {
            self.paths.extracted_folder = v;
        }
        if let Some(v) = lookup("CHUNKED_INPUT_FOLDER_PATH") {
            self.paths.chunk_input_folder = Some(v);
        }
        if let Some(v) = lookup("CHUNKED_OUTPUT_FOLDER_PATH") {
            self.paths.chunks_folder = v;
        }
        if let Some(v) = lookup("VERBOSE_OUTPUT") {
            self.verbose = parse_flag(&v);
        }
        Ok(())
    }

    /// Check the settings that can only fail at use time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk_window()?;
        self.text_cleaner()?;
        if self.embedding.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.max_workers".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn chunk_window(&self) -> Result<ChunkWindow, ChunkError> {
        ChunkWindow::new(self.chunking.window_size, self.chunking.overlap)
    }

    pub fn text_cleaner(&self) -> Result<TextCleaner, ConfigError> {
        Ok(TextCleaner::from_pattern(
            self.extraction.watermark_pattern.as_deref(),
        )?)
    }
}

/// `true` iff the value is `true`, ignoring case and surrounding whitespace.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_pipeline_conventions() {
        let config = PipelineConfig::default();
        assert!(config.extraction.clean_text);
        assert_eq!(config.ocr.render_dpi, 300);
        assert_eq!(config.chunking.window_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
        assert_eq!(config.embedding.ollama_model, "nomic-embed-text:latest");
        assert_eq!(config.embedding.ollama_url, "http://localhost:11434");
        assert_eq!(config.embedding.max_workers, 4);
        assert_eq!(config.paths.chunk_input(), config.paths.extracted_folder);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "chunking:\n  window_size: 200\nembedding:\n  backend: sentence_transformer\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chunking.window_size, 200);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(
            config.embedding.backend,
            EmbeddingBackend::SentenceTransformer
        );
        assert!(config.ocr.enabled);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = PipelineConfig::default();
        config
            .apply_env_overrides(env(&[
                ("CLEAN_EXTRACTED_TEXT", "False"),
                ("EMBEDDING_TYPE", "sentence_transformer"),
                ("CHUNKED_MODEL_NAME", "legacy-model"),
                ("OLLAMA_URL", "http://gpu-box:11434/"),
                ("CHUNK_SIZE", "300"),
                ("CHUNKED_INPUT_FOLDER_PATH", "/tmp/in"),
                ("VERBOSE_OUTPUT", "TRUE"),
            ]))
            .unwrap();
        assert!(!config.extraction.clean_text);
        assert_eq!(
            config.embedding.backend,
            EmbeddingBackend::SentenceTransformer
        );
        assert_eq!(config.embedding.ollama_model, "legacy-model");
        assert_eq!(config.embedding.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.chunking.window_size, 300);
        assert_eq!(config.paths.chunk_input(), "/tmp/in");
        assert!(config.verbose);
    }

    #[test]
    fn current_model_name_wins_over_legacy() {
        let mut config = PipelineConfig::default();
        config
            .apply_env_overrides(env(&[
                ("OLLAMA_MODEL_NAME", "current"),
                ("CHUNKED_MODEL_NAME", "legacy"),
            ]))
            .unwrap();
        assert_eq!(config.embedding.ollama_model, "current");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = PipelineConfig::default();
        assert!(config
            .apply_env_overrides(env(&[("CHUNK_SIZE", "lots")]))
            .is_err());
        assert!(config
            .apply_env_overrides(env(&[("EMBEDDING_TYPE", "word2vec")]))
            .is_err());
    }

    #[test]
    fn validate_catches_bad_window_and_watermark() {
        let mut config = PipelineConfig::default();
        config.chunking.overlap = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Chunk(_))));

        let mut config = PipelineConfig::default();
        config.extraction.watermark_pattern = Some("(".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Watermark(_))));
    }

    #[test]
    fn load_with_fallback_uses_defaults_for_missing_file() {
        let config = PipelineConfig::load_with_fallback(Some("/definitely/not/here.yaml"));
        assert_eq!(config.chunking.window_size, 500);
    }
}
