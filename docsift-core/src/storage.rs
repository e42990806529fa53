use crate::cache::{ExtractionCacheKey, ExtractionCacheValue};
use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage abstraction for caching extraction results
pub trait ExtractionStorage: Send + Sync {
    fn get_extraction(&self, cache_key: &ExtractionCacheKey) -> Result<Option<ExtractionCacheValue>>;
    fn store_extraction(&self, cache_key: &ExtractionCacheKey, cache_value: &ExtractionCacheValue) -> Result<()>;
}

/// File-based storage implementation using local cache directory
pub struct FileStorage {
    cache_dir: PathBuf,
}

impl FileStorage {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let extraction_dir = cache_dir.join("extraction");
        fs::create_dir_all(&extraction_dir)
            .with_context(|| format!("Failed to create cache directory {}", extraction_dir.display()))?;

        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn extraction_path(&self, cache_key: &ExtractionCacheKey) -> PathBuf {
        self.cache_dir
            .join("extraction")
            .join(format!("{}.json", cache_key.to_cache_hash()))
    }
}

impl ExtractionStorage for FileStorage {
    fn get_extraction(&self, cache_key: &ExtractionCacheKey) -> Result<Option<ExtractionCacheValue>> {
        let path = self.extraction_path(cache_key);
        if path.exists() {
            let json_str = fs::read_to_string(&path)?;
            let cache_value: ExtractionCacheValue = serde_json::from_str(&json_str)
                .map_err(|e| anyhow!("Failed to deserialize cached extraction {}: {}", path.display(), e))?;
            Ok(Some(cache_value))
        } else {
            Ok(None)
        }
    }

    fn store_extraction(&self, cache_key: &ExtractionCacheKey, cache_value: &ExtractionCacheValue) -> Result<()> {
        let path = self.extraction_path(cache_key);
        let json_str = serde_json::to_string_pretty(cache_value)
            .map_err(|e| anyhow!("Failed to serialize extraction cache value: {}", e))?;
        fs::write(path, json_str)?;
        Ok(())
    }
}

/// Hash of the full document bytes, prefixed by their length.
pub fn calculate_document_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.len().to_le_bytes());
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Calculate hash for settings data (for the cache key)
pub fn calculate_config_hash<T: serde::Serialize>(config: &T) -> Result<String> {
    let config_json = serde_json::to_string(config)
        .map_err(|e| anyhow!("Failed to serialize config for hashing: {}", e))?;

    let mut hasher = Sha256::new();
    hasher.update(config_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// No-op storage implementation that disables all caching
pub struct NoOpStorage;

impl Default for NoOpStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl NoOpStorage {
    pub fn new() -> Self {
        Self
    }
}

impl ExtractionStorage for NoOpStorage {
    fn get_extraction(&self, _cache_key: &ExtractionCacheKey) -> Result<Option<ExtractionCacheValue>> {
        Ok(None) // Always cache miss
    }

    fn store_extraction(&self, _cache_key: &ExtractionCacheKey, _cache_value: &ExtractionCacheValue) -> Result<()> {
        Ok(())
    }
}
