//! QA record stripping
//!
//! QA files are JSON arrays of records carrying `prompt`, `response` and
//! whatever metadata the generator attached. Stripping keeps only the two
//! payload keys and drops records missing either.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// A record reduced to its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub prompt: Value,
    pub response: Value,
}

impl QaPair {
    /// `None` unless the record is an object holding both keys.
    pub fn from_record(record: &Value) -> Option<Self> {
        let object = record.as_object()?;
        Some(Self {
            prompt: object.get("prompt")?.clone(),
            response: object.get("response")?.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StripReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub records_kept: usize,
    pub records_dropped: usize,
}

/// Keep the QA pairs of one file's records; the second value counts drops.
pub fn strip_records(records: &[Value]) -> (Vec<QaPair>, usize) {
    let kept: Vec<QaPair> = records.iter().filter_map(QaPair::from_record).collect();
    let dropped = records.len() - kept.len();
    (kept, dropped)
}

/// Strip every `*.json` file in `input_folder` into `output_folder`, keeping
/// file names. Files that are not a JSON array are skipped and counted.
pub fn strip_folder(input_folder: &Path, output_folder: &Path) -> Result<StripReport> {
    if !input_folder.is_dir() {
        bail!("Input folder does not exist: {}", input_folder.display());
    }
    fs::create_dir_all(output_folder)
        .with_context(|| format!("Failed to create output folder {}", output_folder.display()))?;

    let mut files: Vec<_> = fs::read_dir(input_folder)
        .with_context(|| format!("Failed to list {}", input_folder.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();

    let mut report = StripReport::default();
    if files.is_empty() {
        warn!(input = %input_folder.display(), "No JSON files found");
        return Ok(report);
    }

    for path in &files {
        let records = match read_records(path) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable QA file");
                report.files_skipped += 1;
                continue;
            }
        };

        let (kept, dropped) = strip_records(&records);
        if dropped > 0 {
            debug!(path = %path.display(), dropped, "Dropped records without prompt/response");
        }

        let Some(name) = path.file_name() else {
            continue;
        };
        let output_file = output_folder.join(name);
        if let Err(e) = write_pairs(&output_file, &kept) {
            error!(path = %output_file.display(), error = %e, "Failed to write stripped QA file");
            report.files_skipped += 1;
            continue;
        }

        report.files_processed += 1;
        report.records_kept += kept.len();
        report.records_dropped += dropped;
    }

    info!(
        files = report.files_processed,
        skipped = report.files_skipped,
        kept = report.records_kept,
        dropped = report.records_dropped,
        "Stripped QA files"
    );
    Ok(report)
}

fn write_pairs(path: &Path, pairs: &[QaPair]) -> Result<()> {
    let json = serde_json::to_string_pretty(pairs)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)?;
    let records: Vec<Value> = serde_json::from_str(&content)?;
    Ok(records)
}
