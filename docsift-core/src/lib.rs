// Docsift Core Library
//
// Recovers text from PDF, DOCX, PPTX and plain-text documents (with OCR
// fallback), cleans it, and splits it into overlapping word windows ready
// for embedding.

pub mod cache;
pub mod chunker;
pub mod cleaning;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractors;
pub mod ocr;
pub mod processor;
pub mod storage;
pub mod strip;
pub mod types;

// Re-export main types and functions for easy use
pub use types::*;
pub use chunker::{build_chunks, split_text, ChunkWindow};
pub use cleaning::{clean, is_garbage, TextCleaner};
pub use config::PipelineConfig;
pub use embeddings::{create_embedder, Embedder};
pub use error::{ChunkError, ConfigError, EmbeddingError, ExtractionError};
pub use extractors::{ExtractionDispatcher, Extractor};
pub use ocr::{ImageOcr, OcrEngine};
pub use processor::{ChunkingMode, ChunkingProcessor, ExtractionProcessor, FileTimings, Stage};
pub use strip::{strip_folder, StripReport};
