// ============================================================
// Layer 3 — Pipeline Configuration
// ============================================================
// Every knob the windowing and batching pipeline reads.
// The pipeline only ever reads this struct; it never mutates it.
//
// Serialisable so a run's configuration can be written next to
// its progress file and reloaded when resuming. A resumed run
// must use the same configuration, otherwise the regenerated
// batch order differs and the resume lands on other data.
//
// Reference: Rust Book §5 (Structs), serde documentation

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ─── Task ─────────────────────────────────────────────────────────────────────
/// Which model the batches are for. Selects the cost function
/// and the buffer sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Abstractive: the decoder consumes `tgt`
    Generation,
    /// Extractive: only sentence labels matter
    Extraction,
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generation" | "abs" => Ok(Task::Generation),
            "extraction" | "ext" => Ok(Task::Extraction),
            other => Err(format!("unknown task '{other}' (expected generation or extraction)")),
        }
    }
}

// ─── Split ────────────────────────────────────────────────────────────────────
/// A named partition of the corpus; part of every shard file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test  => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test"  => Ok(Split::Test),
            other   => Err(format!("unknown split '{other}' (expected train, valid or test)")),
        }
    }
}

// ─── PipelineConfig ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Shard path prefix; shards are `<prefix>.<split>.<N>.json`
    pub data_path:           String,

    /// Token limit of one window (the model's position limit)
    pub max_pos:             usize,

    /// Targets are cut to this many tokens before the end marker
    pub max_tgt_len:         usize,

    /// Token id written as the last target token
    pub tgt_eos_id:          i64,

    /// Keep segment ids; when false they are all zeroed
    pub use_interval:        bool,

    /// Window overlap divisor; None means windows never overlap
    pub augmentation_number: Option<usize>,

    /// Budget unit; buffers are `batch_size * buffer_multiplier`
    pub batch_size:          usize,

    /// Chunks per minibatch after sub-batching a sorted buffer
    pub batch_num_elements:  usize,

    /// Size of one sort buffer in multiples of `batch_size`
    pub buffer_multiplier:   usize,

    pub task:                Task,

    /// Generation cost: minibatches longer than this pay a penalty
    pub long_batch_threshold: usize,

    /// Generation cost: the penalty added past the threshold
    pub long_batch_penalty:  usize,

    /// Shuffle shards, documents and minibatch order
    pub shuffle:             bool,

    /// Root of all shuffling; same seed + epoch = same batches
    pub seed:                u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path:            "bert_data/cnndm".to_string(),
            max_pos:              512,
            max_tgt_len:          140,
            tgt_eos_id:           2,
            use_interval:         true,
            augmentation_number:  None,
            batch_size:           140,
            batch_num_elements:   8,
            buffer_multiplier:    300,
            task:                 Task::Extraction,
            long_batch_threshold: 6,
            long_batch_penalty:   1000,
            shuffle:              true,
            seed:                 666,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would make the pipeline loop forever,
    /// divide by zero or emit nothing.
    pub fn validate(&self) -> Result<()> {
        if self.max_pos < 2 {
            bail!("max_pos must be at least 2 (got {})", self.max_pos);
        }
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.batch_num_elements == 0 {
            bail!("batch_num_elements must be positive");
        }
        if self.buffer_multiplier == 0 {
            bail!("buffer_multiplier must be positive");
        }
        if self.augmentation_number == Some(0) {
            bail!("augmentation_number must be positive when set");
        }
        Ok(())
    }

    /// Cost target of one sort buffer
    pub fn buffer_target(&self) -> usize {
        self.batch_size * self.buffer_multiplier
    }
}
