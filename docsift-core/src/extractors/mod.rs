//! Per-format text extractors
//!
//! ## Architecture
//!
//! ```text
//! path ─► ExtractionDispatcher ─► (by extension)
//!            ├─ PdfExtractor   ─► direct text ─► tables ─► page OCR
//!            ├─ DocxExtractor  ─► paragraphs, tables, headers/footers, runs, image OCR
//!            ├─ PptxExtractor  ─► per-slide shapes (text, table, group, picture OCR)
//!            └─ TxtExtractor   ─► UTF-8 file contents
//!                     │
//!                     ▼
//!            ExtractionResult (raw text + provenance)
//! ```
//!
//! Extractors never fail past the file boundary: a broken document yields an
//! empty string and a warning in the log.

pub mod docx;
pub mod ooxml;
pub mod pdf;
pub mod pptx;
pub mod txt;

pub use docx::DocxExtractor;
pub use pdf::{PdfBackend, PdfExtractor};
pub use pptx::PptxExtractor;
pub use txt::TxtExtractor;

use crate::config::OcrConfig;
use crate::error::ExtractionError;
use crate::ocr::ImageOcr;
use crate::types::{DocumentFormat, ExtractionResult};
use std::path::Path;
use tracing::{debug, warn};

/// Converts one document format into raw text.
pub trait Extractor: Send + Sync {
    fn format(&self) -> DocumentFormat;

    /// Extract from the file's bytes. Sub-step failures are absorbed inside;
    /// an `Err` here means nothing at all could be recovered.
    fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError>;

    /// Extract from a path. Never fails; unreadable documents yield empty text.
    fn extract_file(&self, path: &Path) -> ExtractionResult {
        let result = std::fs::read(path)
            .map_err(ExtractionError::from)
            .and_then(|bytes| self.extract_bytes(&bytes));
        result.unwrap_or_else(|e| {
            warn!(path = %path.display(), format = %self.format(), error = %e, "Extraction failed");
            ExtractionResult::empty(self.format())
        })
    }

    fn extract(&self, path: &Path) -> String {
        self.extract_file(path).text
    }
}

/// Routes a path to the extractor for its extension.
pub struct ExtractionDispatcher {
    ocr_available: bool,
    pdf: PdfExtractor,
    docx: DocxExtractor,
    pptx: PptxExtractor,
    txt: TxtExtractor,
}

impl ExtractionDispatcher {
    /// Create the dispatcher with full dependency injection
    pub fn new_with_dependencies(ocr: ImageOcr, pdf: PdfExtractor) -> Self {
        Self {
            ocr_available: ocr.is_available(),
            pdf,
            docx: DocxExtractor::new(ocr.clone()),
            pptx: PptxExtractor::new(ocr),
            txt: TxtExtractor,
        }
    }

    /// Detect OCR and the PDF backend once, according to config.
    pub fn from_config(config: &OcrConfig) -> Self {
        let ocr = ImageOcr::from_config(config);
        let pdf = PdfExtractor::with_default_backend(ocr.clone(), config.render_dpi);
        Self::new_with_dependencies(ocr, pdf)
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr_available
    }

    pub fn pdf_backend(&self) -> Option<&str> {
        self.pdf.backend_name()
    }

    pub fn supports(path: &Path) -> bool {
        DocumentFormat::from_path(path).is_some()
    }

    fn extractor(&self, format: DocumentFormat) -> &dyn Extractor {
        match format {
            DocumentFormat::Pdf => &self.pdf,
            DocumentFormat::Docx => &self.docx,
            DocumentFormat::Pptx => &self.pptx,
            DocumentFormat::Txt => &self.txt,
        }
    }

    /// Extract with provenance. `None` means the extension is unsupported.
    pub fn extract_document(&self, path: &Path) -> Option<ExtractionResult> {
        let Some(format) = DocumentFormat::from_path(path) else {
            debug!(path = %path.display(), "Unsupported extension");
            return None;
        };
        Some(self.extractor(format).extract_file(path))
    }

    /// Extract from bytes already in memory. Never fails.
    pub fn extract_bytes(&self, format: DocumentFormat, bytes: &[u8]) -> ExtractionResult {
        self.extractor(format).extract_bytes(bytes).unwrap_or_else(|e| {
            warn!(format = %format, error = %e, "Extraction failed");
            ExtractionResult::empty(format)
        })
    }

    /// Extract text. `None` for unsupported extensions, `Some("")` when a
    /// supported document yields nothing.
    pub fn extract_any(&self, path: &Path) -> Option<String> {
        self.extract_document(path).map(|r| r.text)
    }
}

/// Trim and join the non-empty parts.
pub(crate) fn join_non_empty<'a, I>(parts: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
