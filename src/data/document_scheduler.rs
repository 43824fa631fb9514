// ============================================================
// Layer 4 — Document Scheduler (test mode)
// ============================================================
// Evaluation needs the opposite of training batches: every
// window of a document, in order, grouped so the caller can
// stitch the predictions back into one full-document output.
//
// For each document the scheduler yields a Vec of minibatches:
//
//   document (9 windows), batch_num_elements = 4
//     → [w0 w1 w2 w3] [w4 w5 w6 w7] [w8]
//
// No budget batcher, no sorting, no shuffling. Windows are cut
// in test mode, so the tail of the document is kept and
// oversized windows are truncated rather than lost.
//
// One pass over the split is finite. `repeat()` restarts the
// pass whenever it runs out and never ends by itself; the
// caller decides when to stop pulling.
//
// Reference: Rust Book §13 (Iterators)

use anyhow::Result;
use burn::prelude::Backend;

use crate::data::{
    batcher::{Batch, BatchTensorizer},
    chunker::{ChunkMode, WindowChunker},
    loader::{Shard, ShardSource},
    scheduler::{split_into, usable_record},
};
use crate::domain::{
    chunk::Minibatch,
    config::PipelineConfig,
    record::DocumentRecord,
    traits::ShardLoader,
};

// ─── DocumentPass ─────────────────────────────────────────────────────────────
/// One pass over every document of the split.
pub struct DocumentPass<'a, L> {
    loader:  &'a L,
    chunker: WindowChunker,
    group:   usize,
    shards:  std::vec::IntoIter<Shard>,
    records: Option<std::vec::IntoIter<DocumentRecord>>,
    failed:  bool,
}

impl<'a, L: ShardLoader> DocumentPass<'a, L> {
    fn windows_of(&self, record: &DocumentRecord) -> Vec<Minibatch> {
        split_into(self.chunker.chunk(record), self.group)
    }
}

impl<'a, L: ShardLoader> Iterator for DocumentPass<'a, L> {
    type Item = Result<Vec<Minibatch>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(records) = self.records.as_mut() {
                if let Some(record) = records.find(|r| usable_record(r)) {
                    return Some(Ok(self.windows_of(&record)));
                }
                self.records = None;
                tracing::debug!("Released exhausted test shard");
            }

            let shard = self.shards.next()?;
            match shard.load(self.loader) {
                Ok(records) => self.records = Some(records.into_iter()),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// ─── Repeat ───────────────────────────────────────────────────────────────────
/// Restarts a finite, fallible sequence every time it runs out.
///
/// Stops for good on the first error, or when a freshly
/// started pass produces nothing (repeating it would spin).
pub struct Repeat<F, I> {
    restart: F,
    current: Option<I>,
    yielded: bool,
    stopped: bool,
}

pub fn repeat_passes<F, I>(restart: F) -> Repeat<F, I> {
    Repeat {
        restart,
        current: None,
        yielded: false,
        stopped: false,
    }
}

impl<F, I, T> Iterator for Repeat<F, I>
where
    F: FnMut() -> Result<I>,
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.stopped {
            return None;
        }

        loop {
            if self.current.is_none() {
                match (self.restart)() {
                    Ok(pass) => {
                        self.current = Some(pass);
                        self.yielded = false;
                    }
                    Err(e) => {
                        self.stopped = true;
                        return Some(Err(e));
                    }
                }
            }
            let current = self.current.as_mut()?;

            match current.next() {
                Some(Ok(item)) => {
                    self.yielded = true;
                    return Some(Ok(item));
                }
                Some(Err(e)) => {
                    self.stopped = true;
                    return Some(Err(e));
                }
                None if !self.yielded => {
                    self.stopped = true;
                    return None;
                }
                None => {
                    tracing::debug!("Pass exhausted, starting over");
                    self.current = None;
                }
            }
        }
    }
}

// ─── DocumentScheduler ────────────────────────────────────────────────────────
pub struct DocumentScheduler<L> {
    cfg:    PipelineConfig,
    source: ShardSource,
    loader: L,
}

impl<L: ShardLoader> DocumentScheduler<L> {
    pub fn new(cfg: PipelineConfig, source: ShardSource, loader: L) -> Self {
        Self { cfg, source, loader }
    }

    /// A single pass over the split, shards in index order
    pub fn pass(&self) -> Result<DocumentPass<'_, L>> {
        let shards = self.source.shards(None)?;
        Ok(DocumentPass {
            loader:  &self.loader,
            chunker: WindowChunker::from_config(&self.cfg, ChunkMode::Test),
            group:   self.cfg.batch_num_elements,
            shards:  shards.into_iter(),
            records: None,
            failed:  false,
        })
    }

    /// Passes over the split, one after another, without end
    pub fn repeat<'s>(
        &'s self,
    ) -> Repeat<impl FnMut() -> Result<DocumentPass<'s, L>> + 's, DocumentPass<'s, L>> {
        repeat_passes(move || self.pass())
    }

    /// Like [`Self::pass`], tensorizing each document's minibatches
    pub fn pass_batches<B: Backend>(
        &self,
        device: B::Device,
    ) -> Result<impl Iterator<Item = Result<Vec<Batch<B>>>> + '_> {
        let tensorizer = BatchTensorizer::new(self.cfg.max_pos);
        Ok(self.pass()?.map(move |doc| {
            doc.map(|groups| {
                groups
                    .iter()
                    .map(|g| tensorizer.tensorize::<B>(g, &device))
                    .collect()
            })
        }))
    }

    /// Like [`Self::repeat`], tensorizing each document's minibatches
    pub fn repeat_batches<B: Backend>(
        &self,
        device: B::Device,
    ) -> impl Iterator<Item = Result<Vec<Batch<B>>>> + '_ {
        let tensorizer = BatchTensorizer::new(self.cfg.max_pos);
        self.repeat().map(move |doc| {
            doc.map(|groups| {
                groups
                    .iter()
                    .map(|g| tensorizer.tensorize::<B>(g, &device))
                    .collect()
            })
        })
    }
}
