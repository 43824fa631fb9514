// ============================================================
// Layer 6 — Batch Statistics Logger
// ============================================================
// Records how well an epoch's minibatches were packed, one CSV
// row per epoch.
//
// Columns:
//   epoch         — the epoch number (0-based, as the scheduler counts)
//   minibatches   — minibatches yielded
//   chunks        — windows inside them
//   real_tokens   — source tokens that are real data
//   padded_tokens — source cells once padded to each minibatch's width
//   fill_ratio    — real_tokens / padded_tokens
//
// A fill ratio close to 1.0 means the length sorting works and
// little compute is spent on padding.
//
// Output file: <dir>/batch_stats.csv
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

use crate::data::scheduler::padding_footprint;
use crate::domain::chunk::Chunk;

/// Packing statistics of one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch:         usize,
    pub minibatches:   usize,
    pub chunks:        usize,
    pub real_tokens:   usize,
    pub padded_tokens: usize,
}

impl EpochStats {
    pub fn new(epoch: usize) -> Self {
        Self { epoch, ..Default::default() }
    }

    /// Account for one yielded minibatch
    pub fn record(&mut self, minibatch: &[Chunk], max_pos: usize) {
        let (real, padded) = padding_footprint(minibatch, max_pos);
        self.minibatches   += 1;
        self.chunks        += minibatch.len();
        self.real_tokens   += real;
        self.padded_tokens += padded;
    }

    /// Share of padded cells holding real tokens; 0 when empty
    pub fn fill_ratio(&self) -> f64 {
        if self.padded_tokens == 0 {
            0.0
        } else {
            self.real_tokens as f64 / self.padded_tokens as f64
        }
    }
}

/// Appends epoch statistics to a CSV file.
pub struct StatsLogger {
    csv_path: PathBuf,
}

impl StatsLogger {
    /// Create a new StatsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create stats directory '{}'", dir.display()))?;

        let csv_path = dir.join("batch_stats.csv");

        // Appending across resumed runs keeps one history per directory
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,minibatches,chunks,real_tokens,padded_tokens,fill_ratio")?;
            tracing::debug!("Created stats CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's statistics as a new row
    pub fn log(&self, s: &EpochStats) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{},{},{},{:.6}",
            s.epoch,
            s.minibatches,
            s.chunks,
            s.real_tokens,
            s.padded_tokens,
            s.fill_ratio(),
        )?;

        tracing::debug!(
            "Logged epoch {} stats: {} minibatches, fill {:.3}",
            s.epoch,
            s.minibatches,
            s.fill_ratio(),
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize) -> Chunk {
        Chunk {
            src:             vec![1; len],
            tgt:             vec![2],
            segs:            vec![0; len],
            clss:            vec![0],
            src_sent_labels: vec![1],
            text:            None,
        }
    }

    #[test]
    fn test_fill_ratio() {
        let mut s = EpochStats::new(0);
        assert_eq!(s.fill_ratio(), 0.0);

        s.record(&[chunk(2), chunk(4)], 512);
        s.record(&[chunk(4)], 512);
        assert_eq!(s.minibatches, 2);
        assert_eq!(s.chunks, 3);
        assert_eq!(s.real_tokens, 10);
        assert_eq!(s.padded_tokens, 12);
        assert!((s.fill_ratio() - 10.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_rows_are_appended() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = StatsLogger::new(dir.path().to_string_lossy()).unwrap();

        let mut s = EpochStats::new(0);
        s.record(&[chunk(3)], 512);
        logger.log(&s).unwrap();
        logger.log(&EpochStats::new(1)).unwrap();

        let csv   = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,1,1,3,3,1.000000");
        assert!(lines[2].starts_with("1,0,0,0,0,"));
    }
}
