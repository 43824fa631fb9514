// ============================================================
// Layer 4 — Shard Source and Loader
// ============================================================
// Finds the shard files of a split and reads them on demand.
//
// File naming convention (prefix = config.data_path):
//   <prefix>.train.0.json
//   <prefix>.train.1.json
//   ...
//   <prefix>.valid.0.json
//
// If a split has no numbered shards, the single file
// <prefix>.<split>.json is used instead.
//
// Shards are only LISTED here. Reading a shard is deferred
// until the scheduler reaches it, so at most one shard's
// records are ever held in memory.
//
// Reference: glob crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    config::Split,
    record::DocumentRecord,
    traits::ShardLoader,
};

// ─── JsonShardLoader ──────────────────────────────────────────────────────────
/// Reads a shard stored as a JSON array of records.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonShardLoader;

impl ShardLoader for JsonShardLoader {
    fn load_shard(&self, path: &Path) -> Result<Vec<DocumentRecord>> {
        let bytes = fs::read(path)
            .with_context(|| format!("Cannot read shard '{}'", path.display()))?;

        let values: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Cannot parse shard '{}'", path.display()))?;

        // One bad record costs that record, not the whole shard
        let records: Vec<DocumentRecord> = values
            .into_iter()
            .enumerate()
            .filter_map(|(i, value)| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping record {} of '{}': {}", i, path.display(), e);
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

// ─── Shard ────────────────────────────────────────────────────────────────────
/// A not-yet-loaded shard file of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub path:  PathBuf,
    pub split: Split,
}

impl Shard {
    /// Read the shard's records through `loader`.
    pub fn load(&self, loader: &dyn ShardLoader) -> Result<Vec<DocumentRecord>> {
        let records = loader.load_shard(&self.path)?;
        tracing::info!(
            "Loading {} dataset from {}, number of examples: {}",
            self.split,
            self.path.display(),
            records.len()
        );
        Ok(records)
    }
}

// ─── ShardSource ──────────────────────────────────────────────────────────────
/// Enumerates the shards of one split.
#[derive(Debug, Clone)]
pub struct ShardSource {
    prefix: String,
    split:  Split,
}

impl ShardSource {
    pub fn new(prefix: impl Into<String>, split: Split) -> Self {
        Self { prefix: prefix.into(), split }
    }

    /// The single file used when no numbered shard exists
    pub fn fallback_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}.json", self.prefix, self.split))
    }

    /// Numbered shard files, ordered by their shard index.
    /// Falls back to the single-file convention when none exist.
    pub fn shard_paths(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}.{}.[0-9]*.json",
            glob::Pattern::escape(&self.prefix),
            self.split
        );

        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)
            .with_context(|| format!("Invalid shard pattern '{}'", pattern))?
        {
            let path = entry.with_context(|| format!("Cannot list shards for '{}'", pattern))?;
            paths.push(path);
        }

        if paths.is_empty() {
            tracing::debug!(
                "No numbered {} shards under '{}', using '{}'",
                self.split,
                self.prefix,
                self.fallback_path().display()
            );
            return Ok(vec![self.fallback_path()]);
        }

        // "10" must come after "9", so sort on the parsed index
        paths.sort_by(|a, b| {
            shard_index(a)
                .cmp(&shard_index(b))
                .then_with(|| a.cmp(b))
        });
        Ok(paths)
    }

    /// All shards of the split, shuffled when an RNG is given.
    pub fn shards(&self, rng: Option<&mut StdRng>) -> Result<Vec<Shard>> {
        let mut paths = self.shard_paths()?;
        if let Some(rng) = rng {
            paths.shuffle(rng);
        }

        Ok(paths
            .into_iter()
            .map(|path| Shard { path, split: self.split })
            .collect())
    }
}

/// Parse N out of `<prefix>.<split>.<N>.json`
fn shard_index(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_suffix(".json")?
        .rsplit('.')
        .next()?
        .parse()
        .ok()
}
