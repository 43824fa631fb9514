// ============================================================
// Layer 6 — Progress Store
// ============================================================
// Saves and restores where the scheduler is, so that an
// interrupted run continues on the very next minibatch.
//
// What gets saved:
//   1. progress.json         — IteratorState (epoch + counters)
//   2. pipeline_config.json  — the PipelineConfig of the run
//
// Why save the config too?
//   Resuming regenerates the epoch's batch order from the seed
//   and skips the minibatches already consumed. With a different
//   max_pos, batch size or seed the regenerated order differs
//   and the skip would land on the wrong data.
//
// File layout:
//   <dir>/
//     progress.json
//     pipeline_config.json
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::data::scheduler::IteratorState;
use crate::domain::config::PipelineConfig;

const STATE_FILE:  &str = "progress.json";
const CONFIG_FILE: &str = "pipeline_config.json";

/// Reads and writes run progress inside one directory.
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    /// Create a new ProgressStore, creating the directory if needed.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create progress directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Whether a previous run left a progress file behind
    pub fn has_state(&self) -> bool {
        self.dir.join(STATE_FILE).exists()
    }

    /// Overwrite the progress file with `state`.
    ///
    /// Written to a temporary file first and renamed into place,
    /// so a crash mid-write never leaves a truncated file.
    pub fn save_state(&self, state: &IteratorState) -> Result<()> {
        let path = self.dir.join(STATE_FILE);
        let tmp  = self.dir.join(format!("{STATE_FILE}.tmp"));

        fs::write(&tmp, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Cannot write '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Cannot move progress into '{}'", path.display()))?;

        tracing::debug!(
            "Saved progress: epoch {}, {} this epoch, {} total",
            state.epoch,
            state.iterations_this_epoch,
            state.iterations
        );
        Ok(())
    }

    /// Read the saved progress.
    /// Returns an error if no run has saved progress here yet.
    pub fn load_state(&self) -> Result<IteratorState> {
        let path = self.dir.join(STATE_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!("Cannot find '{}'. Has a run saved progress here?", path.display())
            })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt progress file '{}'", path.display()))
    }

    /// Save the configuration the run uses
    pub fn save_config(&self, cfg: &PipelineConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved pipeline config to '{}'", path.display());
        Ok(())
    }

    /// Load the configuration of the run that saved progress here
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;

        Ok(serde_json::from_str(&json)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ProgressStore) {
        let dir   = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("run").to_string_lossy()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_state_round_trip() {
        let (_dir, store) = store();
        assert!(!store.has_state());
        assert!(store.load_state().is_err());

        let state = IteratorState { epoch: 2, iterations: 340, iterations_this_epoch: 17 };
        store.save_state(&state).unwrap();
        assert!(store.has_state());
        assert_eq!(store.load_state().unwrap(), state);

        // A later save replaces the earlier one
        let later = IteratorState { iterations: 341, iterations_this_epoch: 18, ..state };
        store.save_state(&later).unwrap();
        assert_eq!(store.load_state().unwrap(), later);
    }

    #[test]
    fn test_config_round_trip() {
        let (_dir, store) = store();
        let cfg = PipelineConfig { max_pos: 256, augmentation_number: Some(3), ..Default::default() };
        store.save_config(&cfg).unwrap();
        assert_eq!(store.load_config().unwrap(), cfg);
    }
}
