// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `batches` and `documents`
// and all their configurable flags.
//
// Pipeline flags are shared through `PipelineArgs`, flattened
// into both subcommands. `--config` loads a saved
// PipelineConfig JSON instead; explicit flags are then ignored.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::application::{
    batch_use_case::BatchRunConfig,
    document_use_case::DocumentRunConfig,
};
use crate::domain::config::{PipelineConfig, Split, Task};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run epochs of budget-packed training minibatches
    Batches(BatchesArgs),

    /// Walk the per-document test iterator
    Documents(DocumentsArgs),
}

/// Flags that map one-to-one onto PipelineConfig
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Shard path prefix; shards are <prefix>.<split>.<N>.json
    #[arg(long, default_value = "bert_data/cnndm")]
    pub data_path: String,

    /// Load the whole pipeline config from this JSON file
    #[arg(long)]
    pub config: Option<String>,

    /// Token limit of one window
    #[arg(long, default_value_t = 512)]
    pub max_pos: usize,

    /// Targets are cut to this many tokens before the end marker
    #[arg(long, default_value_t = 140)]
    pub max_tgt_len: usize,

    /// Zero all segment ids
    #[arg(long)]
    pub no_interval: bool,

    /// Let consecutive training windows overlap; the window start
    /// advances by 1/N of the previous window
    #[arg(long)]
    pub augmentation_number: Option<usize>,

    /// Budget unit of the batcher
    #[arg(long, default_value_t = 140)]
    pub batch_size: usize,

    /// Chunks per minibatch
    #[arg(long, default_value_t = 8)]
    pub batch_num_elements: usize,

    /// generation (abs) or extraction (ext)
    #[arg(long, default_value = "extraction")]
    pub task: Task,

    /// Root seed of every shuffle
    #[arg(long, default_value_t = 666)]
    pub seed: u64,

    /// Keep shards, documents and minibatches in file order
    #[arg(long)]
    pub no_shuffle: bool,
}

impl PipelineArgs {
    /// Build the pipeline config from `--config` if given, else from the flags
    pub fn resolve(self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config file '{path}'"))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid config file '{path}'"))
            }
            None => Ok(self.into()),
        }
    }
}

/// Convert CLI PipelineArgs into the domain PipelineConfig.
/// The application layer never sees clap types.
impl From<PipelineArgs> for PipelineConfig {
    fn from(a: PipelineArgs) -> Self {
        PipelineConfig {
            data_path:           a.data_path,
            max_pos:             a.max_pos,
            max_tgt_len:         a.max_tgt_len,
            use_interval:        !a.no_interval,
            augmentation_number: a.augmentation_number,
            batch_size:          a.batch_size,
            batch_num_elements:  a.batch_num_elements,
            task:                a.task,
            seed:                a.seed,
            shuffle:             !a.no_shuffle,
            ..Default::default()
        }
    }
}

/// All arguments for the `batches` command
#[derive(Args, Debug)]
pub struct BatchesArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// train or valid
    #[arg(long, default_value = "train")]
    pub split: Split,

    /// Total number of epochs to reach
    #[arg(long, default_value_t = 1)]
    pub epochs: usize,

    /// Directory for progress, config and statistics files
    #[arg(long, default_value = "batch_state")]
    pub state_dir: String,

    /// Continue from the progress saved in --state-dir
    #[arg(long)]
    pub resume: bool,

    /// Save progress every N minibatches (0 = only at epoch end)
    #[arg(long, default_value_t = 100)]
    pub save_every: usize,
}

impl BatchesArgs {
    pub fn into_run_config(self) -> Result<BatchRunConfig> {
        Ok(BatchRunConfig {
            pipeline:   self.pipeline.resolve()?,
            split:      self.split,
            epochs:     self.epochs,
            state_dir:  self.state_dir,
            resume:     self.resume,
            save_every: self.save_every,
        })
    }
}

/// All arguments for the `documents` command
#[derive(Args, Debug)]
pub struct DocumentsArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long, default_value = "test")]
    pub split: Split,

    /// Stop after N documents, starting over when the split runs out
    #[arg(long)]
    pub limit: Option<usize>,
}

impl DocumentsArgs {
    pub fn into_run_config(self) -> Result<DocumentRunConfig> {
        Ok(DocumentRunConfig {
            pipeline: self.pipeline.resolve()?,
            split:    self.split,
            limit:    self.limit,
        })
    }
}
