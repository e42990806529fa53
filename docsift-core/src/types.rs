use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ===== INPUT DOCUMENTS =====

/// Formats the extraction layer understands. Anything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Txt,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Pptx,
        DocumentFormat::Txt,
    ];

    /// Resolve a format from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "pptx" => Some(DocumentFormat::Pptx),
            "txt" => Some(DocumentFormat::Txt),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file on disk the pipeline is about to read. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub size_bytes: u64,
}

impl Document {
    /// Returns `None` for unsupported extensions or unreadable metadata.
    pub fn open(path: &Path) -> Option<Self> {
        let format = DocumentFormat::from_path(path)?;
        let size_bytes = std::fs::metadata(path).ok()?.len();
        Some(Self {
            path: path.to_path_buf(),
            format,
            size_bytes,
        })
    }

    /// File name without its extension, used to derive output names.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

// ===== EXTRACTION OUTPUT =====

/// Which strategy recovered a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Native text layer, paragraphs or text frames
    Direct,
    /// Reconstructed from table cells
    Table,
    /// Recognized from a rendered page or an embedded picture
    Ocr,
}

/// One unit of recovered text. `unit` is the 1-based page or slide number for
/// paged formats and 0 for flowing formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub provenance: Provenance,
    pub unit: u32,
    pub text: String,
}

impl TextSegment {
    pub fn new(provenance: Provenance, unit: u32, text: impl Into<String>) -> Self {
        Self {
            provenance,
            unit,
            text: text.into(),
        }
    }
}

/// Raw text recovered from one document, before cleaning.
///
/// Segments are kept for provenance reporting only; `text` is the assembled,
/// format-specific rendition that gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub format: DocumentFormat,
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TextSegment>,
}

impl ExtractionResult {
    pub fn new(format: DocumentFormat, text: String, segments: Vec<TextSegment>) -> Self {
        Self {
            format,
            text,
            segments,
        }
    }

    pub fn empty(format: DocumentFormat) -> Self {
        Self::new(format, String::new(), Vec::new())
    }

    pub fn count_by(&self, provenance: Provenance) -> usize {
        self.segments
            .iter()
            .filter(|s| s.provenance == provenance)
            .count()
    }
}

// ===== RUN SUMMARY =====

/// Characters of extracted text kept in a summary record.
pub const PREVIEW_CHARS: usize = 200;

/// Outcome of one input file in an extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub input_file: String,
    pub output_file: Option<String>,
    pub word_count: usize,
    pub char_count: usize,
    pub success: bool,
    pub preview: String,
    pub text_cleaned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    pub fn success(input_file: &Path, output_file: &Path, text: &str, text_cleaned: bool) -> Self {
        Self {
            input_file: input_file.display().to_string(),
            output_file: Some(output_file.display().to_string()),
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            success: true,
            preview: preview(text),
            text_cleaned,
            error: None,
        }
    }

    pub fn failure(input_file: &Path, text_cleaned: bool, error: impl Into<String>) -> Self {
        Self {
            input_file: input_file.display().to_string(),
            output_file: None,
            word_count: 0,
            char_count: 0,
            success: false,
            preview: String::new(),
            text_cleaned,
            error: Some(error.into()),
        }
    }
}

/// First `PREVIEW_CHARS` characters, with `...` appended when truncated.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ===== CHUNKS =====

/// A window of consecutive words from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_file: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub character_count: usize,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(source_file: &str, stem: &str, chunk_index: usize, text: String) -> Self {
        Self {
            source_file: source_file.to_string(),
            chunk_id: format!("{stem}_chunk_{chunk_index}"),
            chunk_index,
            character_count: text.chars().count(),
            word_count: text.split_whitespace().count(),
            text,
            embedding: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("Docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("xyz"), None);
        assert_eq!(
            DocumentFormat::from_path(Path::new("deck.final.PPTX")),
            Some(DocumentFormat::Pptx)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn preview_truncates_long_text() {
        let short = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&short), short);

        let long = "é".repeat(PREVIEW_CHARS + 1);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn file_result_omits_missing_error() {
        let ok = FileResult::success(
            Path::new("in/a.txt"),
            Path::new("out/a_extracted.txt"),
            "two words",
            true,
        );
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["word_count"], 2);
        assert_eq!(json["char_count"], 9);

        let failed = FileResult::failure(Path::new("in/b.pdf"), true, "no text");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "no text");
        assert!(json["output_file"].is_null());
    }

    #[test]
    fn chunk_counts_and_id() {
        let chunk = Chunk::new("report.txt", "report", 3, "héllo big world".to_string());
        assert_eq!(chunk.chunk_id, "report_chunk_3");
        assert_eq!(chunk.word_count, 3);
        assert_eq!(chunk.character_count, 15);
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json.get("embedding").is_none());
    }
}
