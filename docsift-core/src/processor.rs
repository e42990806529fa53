use crate::cache::{ExtractionCacheKey, ExtractionCacheValue, ExtractionSettings, SegmentCounts};
use crate::chunker::{build_chunks, ChunkWindow};
use crate::cleaning::TextCleaner;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::extractors::ExtractionDispatcher;
use crate::storage::{
    calculate_config_hash, calculate_document_hash, ExtractionStorage, FileStorage, NoOpStorage,
};
use crate::types::{file_stem, Chunk, DocumentFormat, FileResult};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Name of the run summary written next to the extracted text files.
pub const SUMMARY_FILE: &str = "ocr_processing_summary.json";

/// Stages a file passes through on its way from input to output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    CacheKey,
    CacheLookup,
    Extract,
    CacheStore,
    Clean,
    Chunk,
    Embed,
    Write,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::CacheKey => "cache_key",
            Stage::CacheLookup => "cache_lookup",
            Stage::Extract => "extract",
            Stage::CacheStore => "cache_store",
            Stage::Clean => "clean",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Write => "write",
        }
    }
}

/// Stage timings for one file.
///
/// Every stage is logged as a `debug!` event as it finishes. When profiling
/// is on, the durations are also kept so [`FileTimings::finish`] can print a
/// one-line breakdown for the file.
pub struct FileTimings {
    file: String,
    keep: bool,
    stages: Vec<(Stage, Duration)>,
}

impl FileTimings {
    pub fn new(path: &Path, profiling: bool) -> Self {
        Self {
            file: display_name(path),
            keep: profiling,
            stages: Vec::new(),
        }
    }

    pub fn measure<R>(&mut self, stage: Stage, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        debug!(
            file = %self.file,
            stage = stage.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage finished"
        );
        if self.keep {
            self.stages.push((stage, elapsed));
        }
        result
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.iter().map(|(stage, _)| *stage)
    }

    /// `extract 12ms, clean 3ms, write 0ms (15ms)`, or `None` when nothing was kept.
    pub fn breakdown(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        let total: Duration = self.stages.iter().map(|(_, d)| *d).sum();
        let parts: Vec<String> = self
            .stages
            .iter()
            .map(|(stage, d)| format!("{} {}ms", stage.as_str(), d.as_millis()))
            .collect();
        Some(format!("{} ({}ms)", parts.join(", "), total.as_millis()))
    }

    pub fn finish(self) {
        if let Some(line) = self.breakdown() {
            println!("⏱️  {}: {}", self.file, line);
        }
    }
}

/// Files directly inside `folder` accepted by `keep`, sorted by file name.
/// Office lock files (`~$...`) are never returned.
fn list_files(folder: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        bail!("Input folder does not exist: {}", folder.display());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("Failed to list {}", folder.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            !path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with("~$"))
                .unwrap_or(true)
        })
        .filter(|path| keep(path))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Batch extraction: documents in, `<stem>_extracted.txt` plus a run summary out.
pub struct ExtractionProcessor {
    dispatcher: ExtractionDispatcher,
    storage: Box<dyn ExtractionStorage>,
    cleaner: Option<TextCleaner>,
    settings_hash: String,
    skip_cache: bool,
    profiling: bool,
}

impl ExtractionProcessor {
    /// Create the processor with full dependency injection.
    /// `cleaner` is `None` when cleaning is turned off.
    pub fn new_with_dependencies(
        dispatcher: ExtractionDispatcher,
        storage: Box<dyn ExtractionStorage>,
        cleaner: Option<TextCleaner>,
        settings: &ExtractionSettings,
    ) -> Result<Self> {
        Ok(Self {
            dispatcher,
            storage,
            cleaner,
            settings_hash: calculate_config_hash(settings)?,
            skip_cache: false,
            profiling: false,
        })
    }

    /// Detect OCR and the PDF backend, open the cache, build the cleaner.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let dispatcher = ExtractionDispatcher::from_config(&config.ocr);
        let settings = ExtractionSettings::new(
            &config.ocr,
            dispatcher.ocr_available(),
            dispatcher.pdf_backend(),
        );

        let storage: Box<dyn ExtractionStorage> = if config.cache.enabled {
            let dir = config.cache.resolved_dir();
            match FileStorage::new(&dir) {
                Ok(storage) => {
                    debug!(dir = %dir.display(), "Extraction cache enabled");
                    Box::new(storage)
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Extraction cache unavailable");
                    Box::new(NoOpStorage::new())
                }
            }
        } else {
            Box::new(NoOpStorage::new())
        };

        let cleaner = if config.extraction.clean_text {
            Some(config.text_cleaner()?)
        } else {
            None
        };

        Self::new_with_dependencies(dispatcher, storage, cleaner, &settings)
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn cleans_text(&self) -> bool {
        self.cleaner.is_some()
    }

    /// Supported documents in `data_folder`, sorted by name.
    pub fn list_documents(data_folder: &Path) -> Result<Vec<PathBuf>> {
        list_files(data_folder, |p| DocumentFormat::from_path(p).is_some())
    }

    /// Extract every supported document in `data_folder`.
    ///
    /// Only a missing input folder (or an output folder that cannot be
    /// created) is an error; per-file problems become failure records.
    pub fn process_folder(&self, data_folder: &Path, output_folder: &Path) -> Result<Vec<FileResult>> {
        let documents = Self::list_documents(data_folder)?;
        fs::create_dir_all(output_folder)
            .with_context(|| format!("Failed to create output folder {}", output_folder.display()))?;

        info!(
            input = %data_folder.display(),
            output = %output_folder.display(),
            files = documents.len(),
            cleaning = self.cleans_text(),
            "Starting extraction run"
        );
        let summary_path = output_folder.join(SUMMARY_FILE);
        let mut results = Vec::with_capacity(documents.len());
        if documents.is_empty() {
            warn!(input = %data_folder.display(), "No supported files found");
            save_summary(&summary_path, &results);
        }

        // The summary on disk is current after every file
        for path in &documents {
            results.push(self.process_file(path, output_folder));
            save_summary(&summary_path, &results);
        }

        Ok(results)
    }

    /// Extract, clean and save one document. Never fails.
    pub fn process_file(&self, path: &Path, output_folder: &Path) -> FileResult {
        let cleaned = self.cleans_text();
        let Some(format) = DocumentFormat::from_path(path) else {
            return FileResult::failure(path, cleaned, "unsupported format");
        };

        println!("📄 Processing: {}", display_name(path));
        let mut timings = FileTimings::new(path, self.profiling);
        let outcome = self.extract_and_save(path, format, output_folder, &mut timings);
        timings.finish();

        match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to process document");
                println!("❌ {}: {:#}", display_name(path), e);
                FileResult::failure(path, cleaned, format!("{e:#}"))
            }
        }
    }

    fn extract_and_save(
        &self,
        path: &Path,
        format: DocumentFormat,
        output_folder: &Path,
        timings: &mut FileTimings,
    ) -> Result<FileResult> {
        let cleaned = self.cleans_text();
        let raw = self.extract_raw(path, format, timings)?;
        if raw.trim().is_empty() {
            warn!(path = %path.display(), "No text extracted");
            println!("⚠️  No text extracted from {}", display_name(path));
            return Ok(FileResult::failure(path, cleaned, "no text extracted"));
        }

        let text = match &self.cleaner {
            Some(cleaner) => timings.measure(Stage::Clean, || cleaner.clean(&raw)),
            None => raw,
        };
        if text.trim().is_empty() {
            warn!(path = %path.display(), "Nothing left after cleaning");
            println!("⚠️  Nothing left after cleaning {}", display_name(path));
            return Ok(FileResult::failure(path, cleaned, "no text left after cleaning"));
        }

        let output_file = output_folder.join(format!("{}_extracted.txt", file_stem(path)));
        timings
            .measure(Stage::Write, || fs::write(&output_file, &text))
            .with_context(|| format!("Failed to write {}", output_file.display()))?;

        let result = FileResult::success(path, &output_file, &text, cleaned);
        info!(
            path = %path.display(),
            words = result.word_count,
            chars = result.char_count,
            "Saved extracted text"
        );
        println!(
            "✅ {}: {} words → {}",
            display_name(path),
            result.word_count,
            display_name(&output_file)
        );
        Ok(result)
    }

    /// Raw (uncleaned) text of one document, through the cache.
    fn extract_raw(&self, path: &Path, format: DocumentFormat, timings: &mut FileTimings) -> Result<String> {
        let bytes = timings
            .measure(Stage::Read, || fs::read(path))
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let cache_key = timings.measure(Stage::CacheKey, || {
            ExtractionCacheKey::new(calculate_document_hash(&bytes), self.settings_hash.clone())
        });

        if self.skip_cache {
            debug!(path = %path.display(), "Skipping cache lookup");
        } else {
            match timings.measure(Stage::CacheLookup, || self.storage.get_extraction(&cache_key)) {
                Ok(Some(cached)) => {
                    println!("🎯 Cache hit: {}", display_name(path));
                    debug!(path = %path.display(), created_at = %cached.created_at, "Extraction cache hit");
                    return Ok(cached.text);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Cache lookup failed"),
            }
        }

        let start = Instant::now();
        let result = timings.measure(Stage::Extract, || self.dispatcher.extract_bytes(format, &bytes));
        let counts = SegmentCounts::of(&result);
        debug!(
            path = %path.display(),
            direct = counts.direct,
            table = counts.table,
            ocr = counts.ocr,
            "Extraction finished"
        );

        if !self.skip_cache {
            let cache_value = ExtractionCacheValue::new(&result, start.elapsed().as_millis() as u64);
            if let Err(e) = timings.measure(Stage::CacheStore, || {
                self.storage.store_extraction(&cache_key, &cache_value)
            }) {
                warn!(path = %path.display(), error = %e, "Cache storage failed");
            }
        }

        Ok(result.text)
    }
}

fn save_summary(path: &Path, results: &[FileResult]) {
    if let Err(e) = write_summary(path, results) {
        error!(path = %path.display(), error = %e, "Failed to save run summary");
    }
}

/// Rewrite the run summary (4-space indented JSON array).
fn write_summary(path: &Path, results: &[FileResult]) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    results.serialize(&mut serializer)?;
    fs::write(path, buffer).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// What the chunking stage attaches to each chunk.
#[derive(Clone, Copy)]
pub enum ChunkingMode<'a> {
    /// Chunks only, written as `<stem>_chunks_only.json`
    ChunksOnly,
    /// Chunks with vectors, written as `<stem>_vectorized_<suffix>.json`
    Embed(&'a dyn Embedder),
}

impl ChunkingMode<'_> {
    pub fn output_name(&self, stem: &str) -> String {
        match self {
            ChunkingMode::ChunksOnly => format!("{stem}_chunks_only.json"),
            ChunkingMode::Embed(embedder) => format!("{stem}_vectorized_{}.json", embedder.output_suffix()),
        }
    }
}

/// Batch chunking: extracted `.txt` files in, one JSON array of chunks per file out.
pub struct ChunkingProcessor {
    window: ChunkWindow,
    profiling: bool,
}

impl ChunkingProcessor {
    pub fn new(window: ChunkWindow) -> Self {
        Self {
            window,
            profiling: false,
        }
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    /// `.txt` files in `input_folder`, sorted by name.
    pub fn list_text_files(input_folder: &Path) -> Result<Vec<PathBuf>> {
        list_files(input_folder, |p| DocumentFormat::from_path(p) == Some(DocumentFormat::Txt))
    }

    /// Chunks of one document's text, named after `path`.
    pub fn chunk_text(&self, path: &Path, text: &str) -> Vec<Chunk> {
        build_chunks(&display_name(path), &file_stem(path), text, &self.window)
    }

    /// Chunk (and optionally embed) every `.txt` file in `input_folder`.
    ///
    /// The embedder is health-checked once up front; an unavailable backend
    /// aborts the stage. Per-file failures are logged and skipped. Returns the
    /// paths written.
    pub fn process_folder(&self, input_folder: &Path, output_folder: &Path, mode: ChunkingMode<'_>) -> Result<Vec<PathBuf>> {
        let files = Self::list_text_files(input_folder)?;
        if files.is_empty() {
            warn!(input = %input_folder.display(), "No text files found");
            return Ok(Vec::new());
        }
        fs::create_dir_all(output_folder)
            .with_context(|| format!("Failed to create output folder {}", output_folder.display()))?;

        if let ChunkingMode::Embed(embedder) = mode {
            embedder
                .health_check()
                .context("Embedding backend is not available")?;
            info!(suffix = embedder.output_suffix(), dimension = embedder.dimension(), "Embedding backend ready");
        }

        info!(
            files = files.len(),
            window = self.window.window_size(),
            overlap = self.window.overlap(),
            "Starting chunking run"
        );

        let mut written = Vec::new();
        for (index, path) in files.iter().enumerate() {
            println!("📄 Chunking file {}/{}: {}", index + 1, files.len(), display_name(path));
            let mut timings = FileTimings::new(path, self.profiling);
            let outcome = self.process_file(path, output_folder, mode, &mut timings);
            timings.finish();
            match outcome {
                Ok(Some(output)) => written.push(output),
                Ok(None) => {
                    warn!(path = %path.display(), "Skipping empty file");
                    println!("⚠️  Skipping empty file: {}", display_name(path));
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to chunk file");
                    println!("❌ {}: {:#}", display_name(path), e);
                }
            }
        }
        Ok(written)
    }

    /// `Ok(None)` when the file holds no text.
    fn process_file(
        &self,
        path: &Path,
        output_folder: &Path,
        mode: ChunkingMode<'_>,
        timings: &mut FileTimings,
    ) -> Result<Option<PathBuf>> {
        let text = timings
            .measure(Stage::Read, || fs::read_to_string(path))
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut chunks = timings.measure(Stage::Chunk, || self.chunk_text(path, &text));

        if let ChunkingMode::Embed(embedder) = mode {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = timings.measure(Stage::Embed, || embedder.embed_batch(&texts));
            for (chunk, vector) in chunks.iter_mut().zip(vectors) {
                chunk.embedding = Some(vector);
            }
        }

        let output_file = output_folder.join(mode.output_name(&file_stem(path)));
        let json = serde_json::to_string_pretty(&chunks)?;
        timings
            .measure(Stage::Write, || fs::write(&output_file, json))
            .with_context(|| format!("Failed to write {}", output_file.display()))?;

        println!("✅ {} chunks → {}", chunks.len(), display_name(&output_file));
        Ok(Some(output_file))
    }
}
