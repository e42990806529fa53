// The pipeline itself lives in docsift-core; this crate parses arguments,
// resolves configuration and prints progress.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use docsift_core::config::EmbeddingBackend;
use docsift_core::processor::{ChunkingMode, ChunkingProcessor, ExtractionProcessor};
use docsift_core::{create_embedder, strip_folder, ExtractionDispatcher, FileResult, PipelineConfig, StripReport};

// Re-export core types for convenience
pub use docsift_core::*;

#[derive(Parser, Debug)]
#[command(name = "docsift", version)]
#[command(about = "Recover, clean and chunk text from folders of PDF, DOCX, PPTX and TXT files")]
pub struct Cli {
    /// Path to a YAML config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Debug-level logging (same as VERBOSE_OUTPUT=true)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print per-step timings for every file
    #[arg(long, global = true)]
    pub profile: bool,

    /// Skip the extraction cache and force fresh processing
    #[arg(long, global = true)]
    pub skip_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract text from every supported document in the data folder
    Extract(FolderArgs),
    /// Split extracted text into overlapping chunks, optionally embedded
    Chunk(ChunkArgs),
    /// Reduce QA files to their prompt/response pairs
    Strip(FolderArgs),
    /// Extract, then chunk the extracted text
    Run {
        /// Data folder with the source documents
        #[arg(short, long)]
        input: Option<String>,

        #[command(flatten)]
        chunk: ChunkArgs,
    },
    /// Print the resolved configuration and detected capabilities
    ShowConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FolderArgs {
    /// Input folder (overrides the configured one)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output folder (overrides the configured one)
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChunkArgs {
    /// Output folder for chunk files (overrides the configured one)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write chunks without embeddings
    #[arg(long)]
    pub no_embed: bool,

    /// Embedding backend: ollama or sentence_transformer
    #[arg(long)]
    pub backend: Option<String>,

    /// Words per chunk
    #[arg(long)]
    pub window: Option<usize>,

    /// Words shared by consecutive chunks
    #[arg(long)]
    pub overlap: Option<usize>,
}

impl ChunkArgs {
    /// Fold the chunking flags into `config`.
    pub fn apply(&self, config: &mut PipelineConfig) -> Result<()> {
        if let Some(backend) = &self.backend {
            config.embedding.backend = match EmbeddingBackend::parse(backend) {
                Some(b) => b,
                None => bail!("Unknown embedding backend '{}': expected ollama or sentence_transformer", backend),
            };
        }
        if let Some(window) = self.window {
            config.chunking.window_size = window;
        }
        if let Some(overlap) = self.overlap {
            config.chunking.overlap = overlap;
        }
        if let Some(output) = &self.output {
            config.paths.chunks_folder = output.clone();
        }
        Ok(())
    }
}

/// Config file (or defaults), then environment, then command-line flags.
pub fn resolve_config<F>(cli: &Cli, lookup: F) -> Result<PipelineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = PipelineConfig::load_with_fallback(cli.config.as_deref());
    config
        .apply_env_overrides(lookup)
        .context("Invalid environment configuration")?;

    if cli.verbose {
        config.verbose = true;
    }

    match &cli.command {
        Command::Extract(folders) => {
            if let Some(input) = &folders.input {
                config.paths.data_folder = input.clone();
            }
            if let Some(output) = &folders.output {
                config.paths.extracted_folder = output.clone();
            }
        }
        Command::Chunk(args) => args.apply(&mut config)?,
        Command::Strip(folders) => {
            if let Some(input) = &folders.input {
                config.paths.qa_folder = input.clone();
            }
            if let Some(output) = &folders.output {
                config.paths.cleaned_qa_folder = output.clone();
            }
        }
        Command::Run { input, chunk } => {
            if let Some(input) = input {
                config.paths.data_folder = input.clone();
            }
            chunk.apply(&mut config)?;
        }
        Command::ShowConfig => {}
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise debug when verbose and warn when not.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (tests, embedding callers) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Dispatch one parsed command against a resolved config.
pub fn execute(cli: &Cli, config: &PipelineConfig) -> Result<()> {
    match &cli.command {
        Command::Extract(_) => {
            run_extract(config, cli.skip_cache, cli.profile)?;
        }
        Command::Chunk(args) => {
            run_chunk(config, args.no_embed, cli.profile)?;
        }
        Command::Strip(_) => {
            run_strip(config)?;
        }
        Command::Run { chunk, .. } => {
            run_extract(config, cli.skip_cache, cli.profile)?;
            println!();
            run_chunk(config, chunk.no_embed, cli.profile)?;
        }
        Command::ShowConfig => show_config(config)?,
    }
    Ok(())
}

pub fn run_extract(config: &PipelineConfig, skip_cache: bool, profile: bool) -> Result<Vec<FileResult>> {
    let data = Path::new(&config.paths.data_folder);
    let output = Path::new(&config.paths.extracted_folder);
    println!("📂 Extracting documents from: {}", data.display());

    let processor = ExtractionProcessor::from_config(config)?
        .with_skip_cache(skip_cache)
        .with_profiling(profile);
    let results = processor.process_folder(data, output)?;

    let succeeded = results.iter().filter(|r| r.success).count();
    let words: usize = results.iter().map(|r| r.word_count).sum();
    println!("\n📊 Extraction summary:");
    println!("   - Files processed: {}", results.len());
    println!("   - Succeeded: {}", succeeded);
    println!("   - Failed: {}", results.len() - succeeded);
    println!("   - Words extracted: {}", words);
    println!("💾 Text and summary saved to: {}", output.display());
    Ok(results)
}

pub fn run_chunk(config: &PipelineConfig, no_embed: bool, profile: bool) -> Result<usize> {
    let input = Path::new(config.paths.chunk_input());
    let output = Path::new(&config.paths.chunks_folder);
    let processor = ChunkingProcessor::new(config.chunk_window()?).with_profiling(profile);
    println!(
        "✂️  Chunking text from: {} (window {}, overlap {})",
        input.display(),
        processor.window().window_size(),
        processor.window().overlap()
    );

    let written = if no_embed {
        processor.process_folder(input, output, ChunkingMode::ChunksOnly)?
    } else {
        let embedder = create_embedder(&config.embedding).context("Failed to set up embedding backend")?;
        println!("🧠 Embedding with {} (dimension {})", embedder.output_suffix(), embedder.dimension());
        processor.process_folder(input, output, ChunkingMode::Embed(embedder.as_ref()))?
    };

    println!("✅ Wrote {} chunk file(s) to: {}", written.len(), output.display());
    Ok(written.len())
}

pub fn run_strip(config: &PipelineConfig) -> Result<StripReport> {
    let input = Path::new(&config.paths.qa_folder);
    let output = Path::new(&config.paths.cleaned_qa_folder);
    println!("🧹 Stripping QA files in: {}", input.display());

    let report = strip_folder(input, output)?;
    println!("📊 Strip summary:");
    println!("   - Files written: {}", report.files_processed);
    println!("   - Files skipped: {}", report.files_skipped);
    println!("   - Records kept: {}", report.records_kept);
    println!("   - Records dropped: {}", report.records_dropped);
    println!("💾 Cleaned QA files saved to: {}", output.display());
    Ok(report)
}

fn show_config(config: &PipelineConfig) -> Result<()> {
    println!("📋 Resolved configuration:\n");
    print!("{}", serde_yaml::to_string(config)?);

    let dispatcher = ExtractionDispatcher::from_config(&config.ocr);
    println!("\n🔧 Capabilities:");
    println!(
        "   - OCR engine: {}",
        if dispatcher.ocr_available() { "tesseract" } else { "not available" }
    );
    println!("   - PDF backend: {}", dispatcher.pdf_backend().unwrap_or("not available"));
    println!(
        "   - Sentence-transformer embeddings: {}",
        if cfg!(feature = "onnx-embeddings") { "compiled in" } else { "not compiled" }
    );
    println!("   - Cache directory: {}", config.cache.resolved_dir().display());
    Ok(())
}
