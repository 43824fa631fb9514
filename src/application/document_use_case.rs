// ============================================================
// Layer 2 — DocumentUseCase
// ============================================================
// Walks the document-grouped iterator the way an evaluation
// loop would: every window of every document, in order,
// tensorized minibatch by minibatch.
//
//   Step 1: Validate the config            (Layer 3 - domain)
//   Step 2: Build the document scheduler   (Layer 4 - data)
//   Step 3: Tensorize each document        (Layer 4 - data)
//   Step 4: Report windows and minibatches per document
//
// With a limit the scheduler repeats passes until that many
// documents were produced, the way a validation loop that
// runs for a fixed number of steps consumes it.
//
// Reference: Rust Book §13 (Iterators)

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, NdArray};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::Batch,
    document_scheduler::DocumentScheduler,
    loader::{JsonShardLoader, ShardSource},
};
use crate::domain::{
    config::{PipelineConfig, Split},
    traits::ShardLoader,
};

type CpuBackend = NdArray;

// ─── Run Configuration ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRunConfig {
    pub pipeline: PipelineConfig,
    pub split:    Split,

    /// Stop after this many documents, repeating passes as needed
    pub limit:    Option<usize>,
}

/// What one document turned into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub index:       usize,
    pub windows:     usize,
    pub minibatches: usize,

    /// Longest padded source row over the document's minibatches
    pub max_width:   usize,
}

// ─── DocumentUseCase ──────────────────────────────────────────────────────────
pub struct DocumentUseCase {
    config: DocumentRunConfig,
}

impl DocumentUseCase {
    pub fn new(config: DocumentRunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<DocumentReport>> {
        self.execute_with(JsonShardLoader)
    }

    pub fn execute_with<L: ShardLoader>(&self, loader: L) -> Result<Vec<DocumentReport>> {
        let run = &self.config;
        let cfg = &run.pipeline;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Build the scheduler ───────────────────────────────────────
        let source    = ShardSource::new(cfg.data_path.as_str(), run.split);
        let scheduler = DocumentScheduler::new(cfg.clone(), source, loader);
        let device    = NdArrayDevice::default();

        // ── Step 3: Tensorize each document ───────────────────────────────────
        let documents: Box<dyn Iterator<Item = Result<Vec<Batch<CpuBackend>>>> + '_> =
            match run.limit {
                Some(limit) => Box::new(scheduler.repeat_batches::<CpuBackend>(device).take(limit)),
                None        => Box::new(scheduler.pass_batches::<CpuBackend>(device)?),
            };

        // ── Step 4: Report ────────────────────────────────────────────────────
        let mut reports = Vec::new();
        for (index, batches) in documents.enumerate() {
            let batches = batches?;
            let report  = DocumentReport {
                index,
                windows:     batches.iter().map(|b| b.len()).sum(),
                minibatches: batches.len(),
                max_width:   batches.iter().map(|b| b.src.dims()[1]).max().unwrap_or(0),
            };
            tracing::debug!(
                "Document {}: {} windows in {} minibatches",
                report.index,
                report.windows,
                report.minibatches
            );
            reports.push(report);
        }

        tracing::info!("Walked {} documents of the {} split", reports.len(), run.split);
        Ok(reports)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::DocumentRecord;
    use std::path::Path;

    fn document(n_sents: usize, sent_len: usize) -> DocumentRecord {
        let len = n_sents * sent_len;
        DocumentRecord {
            src:             (1..=len as i64).collect(),
            tgt:             vec![5; 3],
            segs:            vec![0; len],
            clss:            (0..n_sents).map(|i| i * sent_len).collect(),
            src_sent_labels: vec![0; n_sents],
            src_txt:         (0..n_sents).map(|i| format!("sentence {i}")).collect(),
            tgt_txt:         "summary".to_string(),
        }
    }

    /// One unsharded file: 2 sentences, then 20 sentences of 4 tokens
    fn run_config(dir: &Path, limit: Option<usize>) -> DocumentRunConfig {
        let docs = vec![document(2, 4), document(20, 4)];
        std::fs::write(dir.join("toy.test.json"), serde_json::to_string(&docs).unwrap()).unwrap();

        DocumentRunConfig {
            pipeline: PipelineConfig {
                data_path:          dir.join("toy").to_string_lossy().into_owned(),
                max_pos:            16,
                batch_num_elements: 2,
                ..Default::default()
            },
            split: Split::Test,
            limit,
        }
    }

    #[test]
    fn test_reports_every_document_once() {
        let dir     = tempfile::tempdir().unwrap();
        let reports = DocumentUseCase::new(run_config(dir.path(), None)).execute().unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].windows, 1);
        assert_eq!(reports[0].minibatches, 1);
        assert!(reports[1].windows > 2);
        assert_eq!(reports[1].minibatches, (reports[1].windows + 1) / 2);
        assert!(reports.iter().all(|r| r.max_width <= 16));
    }

    #[test]
    fn test_limit_wraps_around_the_split() {
        let dir     = tempfile::tempdir().unwrap();
        let reports = DocumentUseCase::new(run_config(dir.path(), Some(5))).execute().unwrap();

        let windows: Vec<usize> = reports.iter().map(|r| r.windows).collect();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0], windows[2]);
        assert_eq!(windows[1], windows[3]);
        assert_eq!(windows[0], windows[4]);
    }
}
