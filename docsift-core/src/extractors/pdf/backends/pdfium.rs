//! PDF access via Google PDFium.
//!
//! `PdfiumBackend` is stateless (`Send + Sync`). Each document binds a fresh
//! `Pdfium` instance because the upstream type is `!Send`, then parses the
//! bytes once; every page query for that document reuses the parsed handle.

use super::{PdfBackend, PdfDocumentHandle, TextRun};
use crate::error::ExtractionError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

/// Maximum dimension (width or height) for rendered page images.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumBackend;

impl PdfiumBackend {
    /// Create the backend, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Fetch one page of an open document.
fn load_page<'a>(document: &PdfDocument<'a>, page: usize) -> Result<PdfPage<'a>, ExtractionError> {
    let pages = document.pages();
    let index = u16::try_from(page).map_err(|_| ExtractionError::PdfRendering {
        page,
        reason: format!("Page index {page} exceeds u16 maximum"),
    })?;
    pages.get(index).map_err(|_| ExtractionError::PdfRendering {
        page,
        reason: format!("Page {page} out of range (document has {} pages)", pages.len()),
    })
}

fn text_layer_error(page: usize, e: PdfiumError) -> ExtractionError {
    ExtractionError::PdfParsing(format!("Text layer unreadable on page {page}: {e}"))
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
/// 2. Alongside the running executable, or in `<exe_dir>/lib`
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfBackendUnavailable(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            for dir in [exe_dir.to_path_buf(), exe_dir.join("lib")] {
                let lib_path =
                    Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from executable directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfBackendUnavailable(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    ExtractionError::PdfParsing(format!("Failed to load PDF: {e}"))
}

/// Pixel dimensions for rendering, both clamped to [1, MAX_DIMENSION_PX]
/// with the aspect ratio preserved.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PdfDocumentHandle for PdfDocument<'_> {
    fn page_count(&self) -> usize {
        self.pages().len() as usize
    }

    fn page_text(&self, page: usize) -> Result<String, ExtractionError> {
        let pdf_page = load_page(self, page)?;
        let text = pdf_page.text().map_err(|e| text_layer_error(page, e))?;
        Ok(text.all())
    }

    fn page_text_runs(&self, page: usize) -> Result<Vec<TextRun>, ExtractionError> {
        let pdf_page = load_page(self, page)?;
        let text = pdf_page.text().map_err(|e| text_layer_error(page, e))?;
        let runs = text
            .segments()
            .iter()
            .map(|segment| {
                let bounds = segment.bounds();
                TextRun::new(
                    segment.text(),
                    bounds.left.value,
                    bounds.right.value,
                    bounds.bottom.value,
                )
            })
            .collect();
        Ok(runs)
    }

    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, ExtractionError> {
        let pdf_page = load_page(self, page)?;
        let width_points = pdf_page.width().value;
        let height_points = pdf_page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w < uncapped_w {
            warn!(page, raw_width = uncapped_w, capped_width = target_w, "Page dimensions capped to {MAX_DIMENSION_PX}px");
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page,
                reason: format!("Rendering failed: {e}"),
            })?;

        debug!(page, width = target_w, height = target_h, "Rendered PDF page");
        Ok(bitmap.as_image())
    }
}

impl PdfBackend for PdfiumBackend {
    fn with_document(
        &self,
        pdf_bytes: &[u8],
        visit: &mut dyn FnMut(&dyn PdfDocumentHandle),
    ) -> Result<(), ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        visit(&document);
        Ok(())
    }

    fn name(&self) -> &str {
        "pdfium"
    }

    fn is_healthy(&self) -> bool {
        load_pdfium().is_ok()
    }
}
