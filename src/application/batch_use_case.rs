// ============================================================
// Layer 2 — BatchUseCase
// ============================================================
// Runs the training-side pipeline for a number of epochs:
//
//   Step 1: Validate the config                    (Layer 3 - domain)
//   Step 2: Restore progress if resuming           (Layer 6 - infra)
//   Step 3: Save the config next to the progress   (Layer 6 - infra)
//   Step 4: Build the epoch scheduler              (Layer 4 - data)
//   Step 5: Pull and tensorize every minibatch     (Layer 4 - data)
//   Step 6: Record packing statistics              (Layer 6 - infra)
//   Step 7: Save progress every N minibatches
//           and at the end of each epoch           (Layer 6 - infra)
//
// `epochs` is the total to reach, not the number to add:
// resuming a 3-epoch run that stopped in epoch 1 finishes
// epochs 1 and 2 only.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §4 (Batcher)

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, NdArray};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{Batch, BatchTensorizer},
    loader::{JsonShardLoader, ShardSource},
    scheduler::{EpochScheduler, IteratorState},
};
use crate::domain::{
    config::{PipelineConfig, Split},
    traits::ShardLoader,
};
use crate::infra::{
    checkpoint::ProgressStore,
    metrics::{EpochStats, StatsLogger},
};

/// CPU backend the CLI tensorizes on
type CpuBackend = NdArray;

// ─── Run Configuration ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunConfig {
    pub pipeline:   PipelineConfig,
    pub split:      Split,
    pub epochs:     usize,
    pub state_dir:  String,
    pub resume:     bool,

    /// Save progress after this many minibatches; 0 saves only at epoch end
    pub save_every: usize,
}

impl Default for BatchRunConfig {
    fn default() -> Self {
        Self {
            pipeline:   PipelineConfig::default(),
            split:      Split::Train,
            epochs:     1,
            state_dir:  "batch_state".to_string(),
            resume:     false,
            save_every: 100,
        }
    }
}

// ─── BatchUseCase ─────────────────────────────────────────────────────────────
pub struct BatchUseCase {
    config: BatchRunConfig,
}

impl BatchUseCase {
    pub fn new(config: BatchRunConfig) -> Self {
        Self { config }
    }

    /// Run over shards read from JSON files
    pub fn execute(&self) -> Result<Vec<EpochStats>> {
        self.execute_with(JsonShardLoader)
    }

    /// Run with any shard loader.
    /// Returns the statistics of every epoch this call completed.
    pub fn execute_with<L: ShardLoader>(&self, loader: L) -> Result<Vec<EpochStats>> {
        let run = &self.config;
        let cfg = &run.pipeline;

        // ── Step 1: Reject unusable settings before touching any file ────────
        cfg.validate()?;

        // ── Step 2: Restore progress ─────────────────────────────────────────
        let store = ProgressStore::new(run.state_dir.as_str())?;
        let state = if run.resume && store.has_state() {
            if let Ok(saved) = store.load_config() {
                if &saved != cfg {
                    tracing::warn!(
                        "Config differs from the one saved in '{}'; resumed batches may not line up",
                        run.state_dir
                    );
                }
            }
            Some(store.load_state()?)
        } else {
            if run.resume {
                tracing::warn!("No saved progress in '{}', starting fresh", run.state_dir);
            }
            None
        };

        // ── Step 3: Save the config used for this run ─────────────────────────
        store.save_config(cfg)?;

        // ── Step 4: Build the scheduler ───────────────────────────────────────
        let source = ShardSource::new(cfg.data_path.as_str(), run.split);
        let mut scheduler = EpochScheduler::new(cfg.clone(), source, loader);
        if let Some(state) = state {
            scheduler = scheduler.resume(state);
        }

        let tensorizer = BatchTensorizer::new(cfg.max_pos);
        let device     = NdArrayDevice::default();
        let logger     = StatsLogger::new(run.state_dir.as_str())?;
        let mut report = Vec::new();

        tracing::info!(
            "Batching {} split from '{}' up to epoch {}",
            run.split,
            cfg.data_path,
            run.epochs
        );

        while scheduler.state().epoch < run.epochs {
            // ── Step 5: Pull and tensorize every minibatch ────────────────────
            let mut epoch = scheduler.next_epoch()?;
            let mut stats = EpochStats::new(epoch.epoch());

            while let Some(minibatch) = epoch.next() {
                let minibatch = minibatch?;
                let batch: Batch<CpuBackend> = tensorizer.tensorize(&minibatch, &device);

                tracing::debug!(
                    "Minibatch {}: {} chunks, src {:?}, tgt {:?}",
                    epoch.state().iterations,
                    batch.len(),
                    batch.src.dims(),
                    batch.tgt.dims(),
                );

                // ── Step 6: Record packing statistics ────────────────────────
                stats.record(&minibatch, cfg.max_pos);

                // ── Step 7: Periodic save ─────────────────────────────────────
                let state = epoch.state();
                if run.save_every > 0 && state.iterations % run.save_every == 0 {
                    store.save_state(&state)?;
                }
            }
            drop(epoch);

            // The epoch ran out, so the scheduler already points at the next one
            let state: IteratorState = scheduler.state();
            store.save_state(&state)?;

            tracing::info!(
                "Epoch {}: {} minibatches, {} chunks, fill ratio {:.3}",
                stats.epoch,
                stats.minibatches,
                stats.chunks,
                stats.fill_ratio(),
            );
            logger.log(&stats)?;
            report.push(stats);
        }

        Ok(report)
    }
}
