use super::Extractor;
use crate::error::ExtractionError;
use crate::types::{DocumentFormat, ExtractionResult, Provenance, TextSegment};

/// Plain UTF-8 text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxtExtractor;

impl Extractor for TxtExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Txt
    }

    fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::Encoding(e.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text).trim().to_string();
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![TextSegment::new(Provenance::Direct, 0, text.clone())]
        };
        Ok(ExtractionResult::new(DocumentFormat::Txt, text, segments))
    }
}
