use crate::config::OcrConfig;
use crate::types::{DocumentFormat, ExtractionResult, Provenance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version constants for cache invalidation
pub mod versions {
    pub const DOCSIFT_VERSION: &str = env!("CARGO_PKG_VERSION");
    /// Bump when any extractor changes what it produces for the same input
    pub const EXTRACTION_VERSION: &str = "1.0.0";
}

/// Everything besides the file bytes that changes extraction output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionSettings {
    pub ocr_enabled: bool,
    pub ocr_engine_available: bool,
    pub pdf_backend: Option<String>,
    pub render_dpi: u32,
    pub min_image_px: u32,
    pub min_embedded_image_px: u32,
}

impl ExtractionSettings {
    pub fn new(config: &OcrConfig, ocr_engine_available: bool, pdf_backend: Option<&str>) -> Self {
        Self {
            ocr_enabled: config.enabled,
            ocr_engine_available,
            pdf_backend: pdf_backend.map(str::to_string),
            render_dpi: config.render_dpi,
            min_image_px: config.min_image_px,
            min_embedded_image_px: config.min_embedded_image_px,
        }
    }
}

/// Cache key (document bytes + settings → raw extraction)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExtractionCacheKey {
    pub document_hash: String,
    pub settings_hash: String,
    pub docsift_version: String,
    pub extraction_version: String,
}

impl ExtractionCacheKey {
    pub fn new(document_hash: String, settings_hash: String) -> Self {
        Self {
            document_hash,
            settings_hash,
            docsift_version: versions::DOCSIFT_VERSION.to_string(),
            extraction_version: versions::EXTRACTION_VERSION.to_string(),
        }
    }

    /// Compute cache key hash for storage
    pub fn to_cache_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&self.document_hash);
        hasher.update(&self.settings_hash);
        hasher.update(&self.docsift_version);
        hasher.update(&self.extraction_version);
        format!("{:x}", hasher.finalize())
    }
}

/// Cached raw (uncleaned) extraction output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCacheValue {
    pub format: DocumentFormat,
    pub text: String,
    pub segment_counts: SegmentCounts,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub cache_version: String,
}

/// How many segments each strategy produced, kept for run diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentCounts {
    pub direct: usize,
    pub table: usize,
    pub ocr: usize,
}

impl SegmentCounts {
    pub fn of(result: &ExtractionResult) -> Self {
        Self {
            direct: result.count_by(Provenance::Direct),
            table: result.count_by(Provenance::Table),
            ocr: result.count_by(Provenance::Ocr),
        }
    }
}

impl ExtractionCacheValue {
    pub fn new(result: &ExtractionResult, processing_time_ms: u64) -> Self {
        Self {
            format: result.format,
            text: result.text.clone(),
            segment_counts: SegmentCounts::of(result),
            created_at: Utc::now(),
            processing_time_ms,
            cache_version: versions::EXTRACTION_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextSegment;

    #[test]
    fn key_hash_depends_on_every_part() {
        let base = ExtractionCacheKey::new("doc".into(), "settings".into());
        let other_doc = ExtractionCacheKey::new("doc2".into(), "settings".into());
        let other_settings = ExtractionCacheKey::new("doc".into(), "settings2".into());
        let mut other_version = base.clone();
        other_version.extraction_version = "0.0.1".into();

        assert_eq!(base.to_cache_hash(), base.clone().to_cache_hash());
        assert_ne!(base.to_cache_hash(), other_doc.to_cache_hash());
        assert_ne!(base.to_cache_hash(), other_settings.to_cache_hash());
        assert_ne!(base.to_cache_hash(), other_version.to_cache_hash());
    }

    #[test]
    fn value_records_segment_counts() {
        let result = ExtractionResult::new(
            DocumentFormat::Pdf,
            "a\n\nb\n\nc".to_string(),
            vec![
                TextSegment::new(Provenance::Direct, 1, "a"),
                TextSegment::new(Provenance::Ocr, 2, "b"),
                TextSegment::new(Provenance::Ocr, 3, "c"),
            ],
        );
        let value = ExtractionCacheValue::new(&result, 12);
        assert_eq!(value.segment_counts, SegmentCounts { direct: 1, table: 0, ocr: 2 });
        assert_eq!(value.text, result.text);
    }

    #[test]
    fn settings_capture_detected_capabilities() {
        let config = OcrConfig::default();
        let with = ExtractionSettings::new(&config, true, Some("pdfium"));
        let without = ExtractionSettings::new(&config, false, Some("pdfium"));
        assert_ne!(with, without);
        assert_eq!(with.render_dpi, 300);
    }
}
