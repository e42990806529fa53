//! PDF Backend trait
//!
//! Defines the interface that PDF backends must implement. A backend parses a
//! document once and hands the extractor a [`PdfDocumentHandle`]; the
//! extractor then asks for one thing at a time (text layer, positioned text
//! runs, rendered page) so that the costlier steps only run when the cheaper
//! ones came up short.

use crate::error::ExtractionError;
use image::DynamicImage;

/// A run of text with its position on the page, in PDF points
/// (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, left: f32, right: f32, bottom: f32) -> Self {
        Self {
            text: text.into(),
            left,
            right,
            bottom,
        }
    }
}

/// An opened PDF document. Pages are 0-based.
pub trait PdfDocumentHandle {
    fn page_count(&self) -> usize;

    /// Native text layer of one page
    fn page_text(&self, page: usize) -> Result<String, ExtractionError>;

    /// Positioned text runs of one page, used to rebuild tables
    fn page_text_runs(&self, page: usize) -> Result<Vec<TextRun>, ExtractionError>;

    /// Rasterize one page at the given resolution
    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, ExtractionError>;
}

/// Backend trait for PDF access
pub trait PdfBackend: Send + Sync {
    /// Parse `pdf_bytes` once and run `visit` against the open document.
    /// Fails when the library is missing or the bytes are not a readable PDF.
    fn with_document(
        &self,
        pdf_bytes: &[u8],
        visit: &mut dyn FnMut(&dyn PdfDocumentHandle),
    ) -> Result<(), ExtractionError>;

    /// Backend identifier for logging/debugging
    fn name(&self) -> &str;

    /// Check if backend is healthy/ready
    fn is_healthy(&self) -> bool;
}

#[cfg(feature = "pdfium-backend")]
pub mod pdfium;

#[cfg(feature = "pdfium-backend")]
pub use self::pdfium::PdfiumBackend;
