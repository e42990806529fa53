//! PDF extraction with per-page fallback
//!
//! Each page goes through up to three steps, moving on while the page text
//! trims to [`SHORT_PAGE_CHARS`] characters or fewer:
//!
//! 1. the native text layer, kept only when longer than the threshold (a
//!    lone "Page 3" or running header on a scanned page is dropped)
//! 2. tables rebuilt from positioned text runs
//! 3. OCR of the page rendered at the configured DPI, adopted only when it
//!    recovers strictly more text than the table step
//!
//! The document is parsed once; all steps query the same open handle.
//!
//! The backend is pluggable; without one every PDF yields empty text.

pub mod backends;

pub use backends::{PdfBackend, PdfDocumentHandle, TextRun};

use super::{join_non_empty, Extractor};
use crate::error::ExtractionError;
use crate::ocr::ImageOcr;
use crate::types::{DocumentFormat, ExtractionResult, Provenance, TextSegment};
use tracing::{debug, warn};

/// Pages whose recovered text trims to this many characters or fewer move on
/// to the next fallback step.
pub const SHORT_PAGE_CHARS: usize = 10;

/// Runs whose baselines differ by at most this many points share a line.
const LINE_TOLERANCE_PT: f32 = 2.0;

/// Horizontal gap (points) that separates two cells on the same line.
const CELL_GAP_PT: f32 = 12.0;

/// A table as rows of cells, cells in reading order.
pub type PdfTable = Vec<Vec<String>>;

pub struct PdfExtractor {
    backend: Option<Box<dyn PdfBackend>>,
    ocr: ImageOcr,
    render_dpi: u32,
}

impl PdfExtractor {
    pub fn new(backend: Option<Box<dyn PdfBackend>>, ocr: ImageOcr, render_dpi: u32) -> Self {
        Self {
            backend,
            ocr,
            render_dpi,
        }
    }

    /// Extractor on which every PDF yields empty text.
    pub fn without_backend(ocr: ImageOcr, render_dpi: u32) -> Self {
        Self::new(None, ocr, render_dpi)
    }

    /// Use PDFium when the library can be found, otherwise no backend.
    pub fn with_default_backend(ocr: ImageOcr, render_dpi: u32) -> Self {
        #[cfg(feature = "pdfium-backend")]
        {
            match backends::PdfiumBackend::new() {
                Ok(backend) => return Self::new(Some(Box::new(backend)), ocr, render_dpi),
                Err(e) => warn!(error = %e, "PDF backend unavailable; PDFs will yield empty text"),
            }
        }
        #[cfg(not(feature = "pdfium-backend"))]
        warn!("Built without a PDF backend; PDFs will yield empty text");

        Self::without_backend(ocr, render_dpi)
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Run the fallback chain on one page (0-based). `None` when nothing was
    /// recovered.
    fn page_segment(&self, document: &dyn PdfDocumentHandle, index: usize) -> Option<TextSegment> {
        let number = index as u32 + 1;

        let mut provenance = Provenance::Direct;
        let mut text = document.page_text(index).unwrap_or_else(|e| {
            warn!(page = number, error = %e, "Text layer extraction failed");
            String::new()
        });

        if char_len(&text) <= SHORT_PAGE_CHARS {
            if !text.trim().is_empty() {
                debug!(page = number, "Dropping short text layer");
            }
            text.clear();
            match document.page_text_runs(index) {
                Ok(runs) => {
                    let tables = render_tables(&detect_tables(&runs));
                    if !tables.is_empty() {
                        debug!(page = number, "Recovered page text from tables");
                        provenance = Provenance::Table;
                        text = tables;
                    }
                }
                Err(e) => warn!(page = number, error = %e, "Table extraction failed"),
            }
        }

        let current = char_len(&text);
        if current <= SHORT_PAGE_CHARS && self.ocr.is_available() {
            match document.render_page(index, self.render_dpi) {
                Ok(image) => {
                    let ocr_text = self.ocr.ocr(Some(&image));
                    if char_len(&ocr_text) > current {
                        debug!(page = number, "Recovered page text with OCR");
                        provenance = Provenance::Ocr;
                        text = ocr_text;
                    }
                }
                Err(e) => warn!(page = number, error = %e, "Page rendering for OCR failed"),
            }
        }

        let text = text.trim();
        (!text.is_empty()).then(|| TextSegment::new(provenance, number, text))
    }
}

impl Extractor for PdfExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let backend = self.backend.as_deref().ok_or_else(|| {
            ExtractionError::PdfBackendUnavailable("no PDF backend configured".to_string())
        })?;

        let mut segments: Vec<TextSegment> = Vec::new();
        backend.with_document(bytes, &mut |document: &dyn PdfDocumentHandle| {
            let pages = document.page_count();
            debug!(backend = backend.name(), pages, "Extracting PDF");
            segments.extend((0..pages).filter_map(|index| self.page_segment(document, index)));
        })?;

        let text = join_non_empty(segments.iter().map(|s| s.text.as_str()), "\n\n");
        Ok(ExtractionResult::new(DocumentFormat::Pdf, text, segments))
    }
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// Rebuild tables from positioned runs.
///
/// Runs are grouped into lines by baseline, and a line is split into cells
/// wherever the horizontal gap exceeds [`CELL_GAP_PT`]. Two or more
/// consecutive lines that each have at least two cells form a table.
pub fn detect_tables(runs: &[TextRun]) -> Vec<PdfTable> {
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|r| !r.text.trim().is_empty()).collect();
    // Top of the page first, then left to right
    sorted.sort_by(|a, b| b.bottom.total_cmp(&a.bottom).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match lines.last_mut() {
            Some(line) if (line[0].bottom - run.bottom).abs() <= LINE_TOLERANCE_PT => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    let mut tables: Vec<PdfTable> = Vec::new();
    let mut current: PdfTable = Vec::new();
    for mut line in lines {
        line.sort_by(|a, b| a.left.total_cmp(&b.left));
        let cells = split_cells(&line);
        if cells.len() >= 2 {
            current.push(cells);
        } else if !current.is_empty() {
            flush_table(&mut tables, &mut current);
        }
    }
    flush_table(&mut tables, &mut current);
    tables
}

fn flush_table(tables: &mut Vec<PdfTable>, current: &mut PdfTable) {
    let rows = std::mem::take(current);
    if rows.len() >= 2 {
        tables.push(rows);
    }
}

fn split_cells(line: &[&TextRun]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut previous_right: Option<f32> = None;
    for run in line {
        let gap = previous_right.map(|right| run.left - right);
        match (gap, cells.last_mut()) {
            (Some(gap), Some(cell)) if gap < CELL_GAP_PT => {
                if gap > 1.0 {
                    cell.push(' ');
                }
                cell.push_str(&run.text);
            }
            _ => cells.push(run.text.clone()),
        }
        previous_right = Some(previous_right.map_or(run.right, |r| r.max(run.right)));
    }
    cells
}

/// Render tables as text: cells trimmed and joined with ` | ` (empty cells
/// kept as empty positions), rows with no content dropped, tables separated
/// by a blank line.
pub fn render_tables(tables: &[PdfTable]) -> String {
    let rendered: Vec<String> = tables
        .iter()
        .map(|table| {
            table
                .iter()
                .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
                .map(|row| row.iter().map(|cell| cell.trim()).collect::<Vec<_>>().join(" | "))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    join_non_empty(rendered.iter().map(String::as_str), "\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::CountingEngine;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend serving canned pages; counts how often a document is parsed.
    #[derive(Default)]
    struct MockPdfBackend {
        pages: Vec<(String, Vec<TextRun>)>,
        unreadable: bool,
        opened: Arc<AtomicUsize>,
    }

    impl MockPdfBackend {
        fn with_pages(pages: Vec<(&str, Vec<TextRun>)>) -> Self {
            Self {
                pages: pages.into_iter().map(|(t, r)| (t.to_string(), r)).collect(),
                ..Self::default()
            }
        }
    }

    struct MockDocument<'a> {
        pages: &'a [(String, Vec<TextRun>)],
    }

    impl PdfDocumentHandle for MockDocument<'_> {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_text(&self, page: usize) -> Result<String, ExtractionError> {
            Ok(self.pages[page].0.clone())
        }

        fn page_text_runs(&self, page: usize) -> Result<Vec<TextRun>, ExtractionError> {
            Ok(self.pages[page].1.clone())
        }

        fn render_page(&self, _page: usize, dpi: u32) -> Result<DynamicImage, ExtractionError> {
            assert_eq!(dpi, 300);
            Ok(DynamicImage::new_rgb8(120, 160))
        }
    }

    impl PdfBackend for MockPdfBackend {
        fn with_document(
            &self,
            _pdf_bytes: &[u8],
            visit: &mut dyn FnMut(&dyn PdfDocumentHandle),
        ) -> Result<(), ExtractionError> {
            if self.unreadable {
                return Err(ExtractionError::PdfParsing("not a PDF".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            visit(&MockDocument { pages: &self.pages });
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    fn extractor(backend: MockPdfBackend, ocr: ImageOcr) -> PdfExtractor {
        PdfExtractor::new(Some(Box::new(backend)), ocr, 300)
    }

    fn grid(rows: &[&[&str]]) -> Vec<TextRun> {
        let mut runs = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            let bottom = 700.0 - r as f32 * 14.0;
            for (c, cell) in row.iter().enumerate() {
                let left = 72.0 + c as f32 * 120.0;
                runs.push(TextRun::new(*cell, left, left + 40.0, bottom));
            }
        }
        runs
    }

    #[test]
    fn text_layer_wins_when_long_enough() {
        let backend = MockPdfBackend::with_pages(vec![
            ("  Page one has plenty of text.  ", vec![]),
            ("Page two also has text.", vec![]),
        ]);
        let engine = CountingEngine::new("should not be used");
        let pdf = extractor(backend, ImageOcr::new(Some(engine.clone())));

        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(result.text, "Page one has plenty of text.\n\nPage two also has text.");
        assert_eq!(result.count_by(Provenance::Direct), 2);
        assert_eq!(result.segments[1].unit, 2);
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn short_page_falls_back_to_tables() {
        let runs = grid(&[&["Drug", "Dose"], &["Aspirin", "100mg"]]);
        let backend = MockPdfBackend::with_pages(vec![("tiny", runs)]);
        let pdf = extractor(backend, ImageOcr::disabled());

        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(result.text, "Drug | Dose\nAspirin | 100mg");
        assert_eq!(result.count_by(Provenance::Table), 1);
    }

    #[test]
    fn scanned_page_is_ocrd_once() {
        let backend = MockPdfBackend::with_pages(vec![("", vec![])]);
        let engine = CountingEngine::new("Scanned page content");
        let pdf = extractor(backend, ImageOcr::new(Some(engine.clone())));

        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(result.text, "Scanned page content");
        assert_eq!(result.count_by(Provenance::Ocr), 1);
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn short_text_layer_is_dropped_before_ocr() {
        let backend = MockPdfBackend::with_pages(vec![("Title page", vec![])]);
        let engine = CountingEngine::new("T1");
        let pdf = extractor(backend, ImageOcr::new(Some(engine.clone())));

        // "Title page" is under the threshold, so OCR only has to beat ""
        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(engine.call_count(), 1);
        assert_eq!(result.text, "T1");
        assert_eq!(result.count_by(Provenance::Ocr), 1);
        assert_eq!(result.count_by(Provenance::Direct), 0);
    }

    #[test]
    fn page_number_only_pages_yield_nothing() {
        let backend = MockPdfBackend::with_pages(vec![
            ("Page 3", vec![]),
            ("Real body text on page two.", vec![]),
        ]);
        let pdf = extractor(backend, ImageOcr::disabled());
        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(result.text, "Real body text on page two.");
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].unit, 2);
    }

    #[test]
    fn recovered_table_skips_ocr() {
        let runs = grid(&[&["A", "B"], &["C", "D"]]);
        let backend = MockPdfBackend::with_pages(vec![("", runs)]);
        let engine = CountingEngine::new("Longer scanned text");
        let pdf = extractor(backend, ImageOcr::new(Some(engine.clone())));

        // The smallest possible table already renders past the threshold
        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(engine.call_count(), 0);
        assert_eq!(result.text, "A | B\nC | D");
        assert_eq!(result.count_by(Provenance::Table), 1);
    }

    #[test]
    fn document_is_parsed_once_for_all_pages() {
        let backend = MockPdfBackend::with_pages(vec![
            ("", grid(&[&["Drug", "Dose"], &["Aspirin", "100mg"]])),
            ("short", vec![]),
            ("A page with a proper text layer.", vec![]),
        ]);
        let opened = backend.opened.clone();
        let engine = CountingEngine::new("Scanned words here");
        let pdf = extractor(backend, ImageOcr::new(Some(engine)));

        pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_pages_are_skipped_without_ocr() {
        let backend = MockPdfBackend::with_pages(vec![
            ("", vec![]),
            ("Second page carries the text", vec![]),
        ]);
        let pdf = extractor(backend, ImageOcr::disabled());
        let result = pdf.extract_bytes(b"%PDF").unwrap();
        assert_eq!(result.text, "Second page carries the text");
        assert_eq!(result.segments[0].unit, 2);
    }

    #[test]
    fn no_backend_or_unreadable_pdf_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4 garbage").unwrap();

        let none = PdfExtractor::without_backend(ImageOcr::disabled(), 300);
        assert!(none.extract_bytes(b"%PDF").is_err());
        assert_eq!(none.extract(&path), "");

        let broken = MockPdfBackend {
            unreadable: true,
            ..MockPdfBackend::default()
        };
        assert_eq!(extractor(broken, ImageOcr::disabled()).extract(&path), "");
    }

    #[test]
    fn runs_close_together_merge_into_one_cell() {
        let runs = vec![
            TextRun::new("Total", 72.0, 100.0, 500.0),
            TextRun::new("due", 104.0, 122.0, 500.5),
            TextRun::new("42.00", 300.0, 330.0, 500.0),
            TextRun::new("Paid", 72.0, 95.0, 486.0),
            TextRun::new("", 200.0, 210.0, 486.0),
            TextRun::new("10.00", 300.0, 330.0, 486.0),
        ];
        let tables = detect_tables(&runs);
        assert_eq!(
            tables,
            vec![vec![
                vec!["Total due".to_string(), "42.00".to_string()],
                vec!["Paid".to_string(), "10.00".to_string()],
            ]]
        );
    }

    #[test]
    fn single_lines_and_prose_are_not_tables() {
        let prose = vec![
            TextRun::new("A heading", 72.0, 140.0, 700.0),
            TextRun::new("Left", 72.0, 100.0, 680.0),
            TextRun::new("Right", 300.0, 330.0, 680.0),
            TextRun::new("A closing line", 72.0, 160.0, 660.0),
        ];
        assert!(detect_tables(&prose).is_empty());
    }

    #[test]
    fn render_keeps_empty_positions_and_drops_blank_rows() {
        let tables = vec![
            vec![
                vec![" a ".to_string(), "".to_string(), "c".to_string()],
                vec![" ".to_string(), "".to_string()],
            ],
            vec![vec!["x".to_string(), "y".to_string()]],
        ];
        assert_eq!(render_tables(&tables), "a |  | c\n\nx | y");
    }

    #[test]
    fn backend_name_is_reported() {
        let pdf = extractor(MockPdfBackend::default(), ImageOcr::disabled());
        assert_eq!(pdf.backend_name(), Some("mock"));
        assert!(MockPdfBackend::default().is_healthy());
    }
}
