//! Error types for the extraction, chunking and embedding layers.
//!
//! Sub-steps inside an extractor return `Result<_, ExtractionError>` so that
//! fallbacks can be chained explicitly. The extractors themselves never let
//! these escape past the file boundary: a failed document becomes an empty
//! string plus a `warn!` line.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid OOXML package: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("XML parsing failed: {0}")]
    Xml(String),

    #[error("Missing package part: {0}")]
    MissingPart(String),

    #[error("PDF backend unavailable: {0}")]
    PdfBackendUnavailable(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("Unsupported format for extraction: {0}")]
    UnsupportedFormat(String),
}

impl From<quick_xml::Error> for ExtractionError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractionError::Xml(e.to_string())
    }
}

impl From<image::ImageError> for ExtractionError {
    fn from(e: image::ImageError) -> Self {
        ExtractionError::ImageProcessing(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid chunk window: size {window_size}, overlap {overlap} (overlap must be smaller than a non-zero size)")]
    InvalidWindow { window_size: usize, overlap: usize },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding service unreachable at {url}: {reason}")]
    ServiceUnavailable { url: String, reason: String },

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Embedding model initialization failed: {0}")]
    ModelInit(String),

    #[error("Embedding backend '{0}' is not compiled into this build")]
    BackendNotCompiled(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("Invalid watermark pattern: {0}")]
    Watermark(#[from] regex::Error),
}
