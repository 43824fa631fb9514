// ============================================================
// Layer 4 — Epoch Scheduler
// ============================================================
// Drives the whole pipeline for one split and one epoch:
//
//   shards (shuffled)
//     └── records (shuffled)           one shard in memory at a time
//           └── WindowChunker          records → chunks
//                 └── BudgetBatcher    chunks → large sort buffers
//                       └── sort + cut buffers → minibatches (shuffled)
//
// Why the two-stage batching?
//   Sorting a whole shard by length would need all of its chunks
//   at once. Instead the budget batcher forms buffers worth
//   `batch_size * buffer_multiplier` elements, each buffer is
//   sorted by length and cut into minibatches of
//   `batch_num_elements`. Chunks of similar length end up
//   together, so padding stays small. Shuffling the order of the
//   finished minibatches (never their contents) keeps the
//   training signal random without losing that benefit.
//
// Resuming:
//   The scheduler counts minibatches handed out in this epoch.
//   A resumed run regenerates the same epoch from the same seed
//   and skips that many minibatches before yielding again.
//   Skipped minibatches are never tensorized.
//
// Reference: Rust Book §13 (Iterators), §10 (Generics)

use anyhow::Result;
use burn::prelude::Backend;
use rand::{rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{Batch, BatchTensorizer},
    budget::{cost_for, BudgetBatcher},
    chunker::{ChunkMode, WindowChunker},
    loader::{Shard, ShardSource},
    shuffler::Shuffler,
};
use crate::domain::{
    chunk::{Chunk, Minibatch},
    config::{PipelineConfig, Task},
    record::DocumentRecord,
    traits::ShardLoader,
};

/// Records with no source tokens or broken invariants are skipped
pub(crate) fn usable_record(record: &DocumentRecord) -> bool {
    if record.src.is_empty() {
        return false;
    }
    match record.validate() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Skipping malformed record: {}", e);
            false
        }
    }
}

/// Cut `chunks` into consecutive groups of `size`; the last may be shorter
pub(crate) fn split_into(chunks: Vec<Chunk>, size: usize) -> Vec<Minibatch> {
    let size = size.max(1);
    let mut groups: Vec<Minibatch> = Vec::with_capacity(chunks.len() / size + 1);
    let mut current = Vec::with_capacity(size);
    for chunk in chunks {
        current.push(chunk);
        if current.len() == size {
            groups.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Sort a buffer by length and cut it into minibatches of `size`.
///
/// generation → by target length, ties by segment length
/// extraction → by segment length
///
/// Both sorts are stable, so equal-length chunks keep their order.
pub fn arrange_buffer(
    mut buffer: Minibatch,
    task: Task,
    size: usize,
    rng: Option<&mut StdRng>,
) -> Vec<Minibatch> {
    match task {
        Task::Generation => buffer.sort_by(|a, b| {
            a.tgt.len()
                .cmp(&b.tgt.len())
                .then_with(|| a.segs.len().cmp(&b.segs.len()))
        }),
        Task::Extraction => buffer.sort_by_key(|c| c.segs.len()),
    }

    let mut minibatches = split_into(buffer, size);
    if let Some(rng) = rng {
        minibatches.shuffle(rng);
    }
    minibatches
}

// ─── ShardMinibatches ─────────────────────────────────────────────────────────
/// Lazy minibatch stream over the records of one loaded shard.
///
/// Owns the records; dropping it releases the shard.
pub struct ShardMinibatches {
    buffers: Box<dyn Iterator<Item = Minibatch>>,
    ready:   std::vec::IntoIter<Minibatch>,
    task:    Task,
    size:    usize,
    rng:     Option<StdRng>,
}

impl ShardMinibatches {
    /// `rng` shuffles documents and minibatch order; None keeps file order.
    pub fn new(mut records: Vec<DocumentRecord>, cfg: &PipelineConfig, mut rng: Option<StdRng>) -> Self {
        if let Some(rng) = rng.as_mut() {
            records.shuffle(rng);
        }

        let chunker = WindowChunker::from_config(cfg, ChunkMode::Train);
        let chunks = records
            .into_iter()
            .filter(usable_record)
            .flat_map(move |record| chunker.chunk(&record));

        Self {
            buffers: Box::new(BudgetBatcher::new(chunks, cfg.buffer_target(), cost_for(cfg))),
            ready:   Vec::new().into_iter(),
            task:    cfg.task,
            size:    cfg.batch_num_elements,
            rng,
        }
    }
}

impl Iterator for ShardMinibatches {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        loop {
            if let Some(minibatch) = self.ready.find(|m| !m.is_empty()) {
                return Some(minibatch);
            }

            let buffer = self.buffers.next()?;
            tracing::trace!("Sorting buffer of {} chunks", buffer.len());
            self.ready = arrange_buffer(buffer, self.task, self.size, self.rng.as_mut()).into_iter();
        }
    }
}

// ─── IteratorState ────────────────────────────────────────────────────────────
/// Where the scheduler is. Persisted so a run can resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IteratorState {
    /// Epoch currently being produced (0-based)
    pub epoch:                 usize,

    /// Minibatches yielded over the scheduler's lifetime
    pub iterations:            usize,

    /// Minibatches yielded in the current epoch
    pub iterations_this_epoch: usize,
}

// ─── EpochMinibatches ─────────────────────────────────────────────────────────
/// The full, deterministic minibatch sequence of one epoch,
/// chained across shards.
pub struct EpochMinibatches<'a, L> {
    cfg:      &'a PipelineConfig,
    loader:   &'a L,
    shuffler: Shuffler,
    epoch:    usize,
    shards:   std::iter::Enumerate<std::vec::IntoIter<Shard>>,
    current:  Option<ShardMinibatches>,
    failed:   bool,
}

impl<'a, L: ShardLoader> Iterator for EpochMinibatches<'a, L> {
    type Item = Result<Minibatch>;

    fn next(&mut self) -> Option<Result<Minibatch>> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(minibatch) = current.next() {
                    return Some(Ok(minibatch));
                }
                // Drop the exhausted shard before the next one is read
                self.current = None;
                tracing::debug!("Released exhausted shard (epoch {})", self.epoch);
            }

            let (position, shard) = self.shards.next()?;
            match shard.load(self.loader) {
                Ok(records) => {
                    let rng = self
                        .cfg
                        .shuffle
                        .then(|| self.shuffler.shard_contents(self.epoch, position));
                    self.current = Some(ShardMinibatches::new(records, self.cfg, rng));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// ─── Epoch ────────────────────────────────────────────────────────────────────
/// One epoch as seen by the training loop: skips the minibatches
/// a previous run already consumed and keeps the counters current.
///
/// When the epoch runs out normally the scheduler moves on to
/// the next epoch. Stopping early leaves the counters where they
/// are, ready to be saved and resumed.
pub struct Epoch<'a, L> {
    minibatches: EpochMinibatches<'a, L>,
    state:       &'a mut IteratorState,
    position:    usize,
    done:        bool,
}

impl<'a, L: ShardLoader> Epoch<'a, L> {
    pub fn epoch(&self) -> usize {
        self.state.epoch
    }

    /// Counters as of the last yielded minibatch
    pub fn state(&self) -> IteratorState {
        *self.state
    }

    /// Tensorize every yielded minibatch
    pub fn batches<B: Backend>(
        self,
        tensorizer: BatchTensorizer,
        device: B::Device,
    ) -> impl Iterator<Item = Result<Batch<B>>> + 'a
    where
        L: 'a,
    {
        self.map(move |minibatch| minibatch.map(|m| tensorizer.tensorize::<B>(&m, &device)))
    }
}

impl<'a, L: ShardLoader> Iterator for Epoch<'a, L> {
    type Item = Result<Minibatch>;

    fn next(&mut self) -> Option<Result<Minibatch>> {
        if self.done {
            return None;
        }

        loop {
            match self.minibatches.next() {
                Some(Ok(minibatch)) => {
                    let index = self.position;
                    self.position += 1;

                    // fast-forward past what a previous run consumed
                    if index < self.state.iterations_this_epoch {
                        continue;
                    }

                    self.state.iterations += 1;
                    self.state.iterations_this_epoch += 1;
                    return Some(Ok(minibatch));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    tracing::info!(
                        "Epoch {} finished after {} minibatches",
                        self.state.epoch,
                        self.position
                    );
                    self.state.epoch += 1;
                    self.state.iterations_this_epoch = 0;
                    return None;
                }
            }
        }
    }
}

// ─── EpochScheduler ───────────────────────────────────────────────────────────
/// Produces epoch after epoch of minibatches for one split.
pub struct EpochScheduler<L> {
    cfg:      PipelineConfig,
    source:   ShardSource,
    loader:   L,
    shuffler: Shuffler,
    state:    IteratorState,
}

impl<L: ShardLoader> EpochScheduler<L> {
    pub fn new(cfg: PipelineConfig, source: ShardSource, loader: L) -> Self {
        let shuffler = Shuffler::new(cfg.seed);
        Self {
            cfg,
            source,
            loader,
            shuffler,
            state: IteratorState::default(),
        }
    }

    /// Continue from a saved state instead of the first epoch
    pub fn resume(mut self, state: IteratorState) -> Self {
        tracing::info!(
            "Resuming at epoch {}, skipping {} minibatches",
            state.epoch,
            state.iterations_this_epoch
        );
        self.state = state;
        self
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    /// Regenerate the complete minibatch sequence of `epoch`.
    /// Touches no counters.
    pub fn epoch_minibatches(&self, epoch: usize) -> Result<EpochMinibatches<'_, L>> {
        let mut order_rng = self.cfg.shuffle.then(|| self.shuffler.shard_order(epoch));
        let shards = self.source.shards(order_rng.as_mut())?;

        Ok(EpochMinibatches {
            cfg:      &self.cfg,
            loader:   &self.loader,
            shuffler: self.shuffler,
            epoch,
            shards:   shards.into_iter().enumerate(),
            current:  None,
            failed:   false,
        })
    }

    /// The current epoch, skipping minibatches already consumed
    pub fn next_epoch(&mut self) -> Result<Epoch<'_, L>> {
        let epoch = self.state.epoch;
        let mut order_rng = self.cfg.shuffle.then(|| self.shuffler.shard_order(epoch));
        let shards = self.source.shards(order_rng.as_mut())?;

        let Self { cfg, loader, shuffler, state, .. } = self;
        Ok(Epoch {
            minibatches: EpochMinibatches {
                cfg,
                loader,
                shuffler: *shuffler,
                epoch,
                shards:   shards.into_iter().enumerate(),
                current:  None,
                failed:   false,
            },
            state,
            position: 0,
            done:     false,
        })
    }
}

/// Total tokens a minibatch carries, and how many it would occupy
/// once padded to its longest source row
pub fn padding_footprint(minibatch: &[Chunk], max_pos: usize) -> (usize, usize) {
    let real: usize = minibatch.iter().map(|c| c.src.len().min(max_pos)).sum();
    let width = minibatch
        .iter()
        .map(|c| c.src.len())
        .max()
        .unwrap_or(0)
        .min(max_pos)
        .max(1);
    (real, width * minibatch.len())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::JsonShardLoader;
    use crate::domain::config::Split;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use rand::SeedableRng;
    use std::{cell::Cell, path::Path, rc::Rc};

    /// A document of `n_sents` sentences of `sent_len` tokens each,
    /// with its first token set to `tag` so documents can be told apart
    fn document(tag: i64, n_sents: usize, sent_len: usize, tgt_len: usize) -> DocumentRecord {
        let len = n_sents * sent_len;
        let mut src: Vec<i64> = (0..len as i64).map(|i| 1000 + i).collect();
        src[0] = tag;
        DocumentRecord {
            src,
            tgt:             vec![1; tgt_len],
            segs:            vec![0; len],
            clss:            (0..n_sents).map(|i| i * sent_len).collect(),
            src_sent_labels: vec![0; n_sents],
            ..Default::default()
        }
    }

    fn write_corpus(dir: &Path, shards: usize, docs_per_shard: usize) -> String {
        for s in 0..shards {
            let docs: Vec<DocumentRecord> = (0..docs_per_shard)
                .map(|d| {
                    let tag = (s * 100 + d) as i64 + 1;
                    document(tag, 4 + d % 7, 3 + (d % 4), 2 + d % 9)
                })
                .collect();
            let path = dir.join(format!("corpus.train.{s}.json"));
            std::fs::write(path, serde_json::to_string(&docs).unwrap()).unwrap();
        }
        dir.join("corpus").to_string_lossy().into_owned()
    }

    fn config(shuffle: bool) -> PipelineConfig {
        PipelineConfig {
            max_pos:            12,
            batch_size:         4,
            buffer_multiplier:  10,
            batch_num_elements: 3,
            shuffle,
            seed:               42,
            ..Default::default()
        }
    }

    fn scheduler(prefix: &str, cfg: PipelineConfig) -> EpochScheduler<JsonShardLoader> {
        EpochScheduler::new(cfg, ShardSource::new(prefix, Split::Train), JsonShardLoader)
    }

    /// First source token of every chunk, minibatch by minibatch
    fn fingerprint(minibatches: &[Minibatch]) -> Vec<Vec<i64>> {
        minibatches
            .iter()
            .map(|m| m.iter().map(|c| c.src[0]).collect())
            .collect()
    }

    fn drain(epoch: Epoch<'_, JsonShardLoader>) -> Vec<Minibatch> {
        epoch.collect::<Result<Vec<_>>>().unwrap()
    }

    fn chunk_of(segs_len: usize, tgt_len: usize) -> Chunk {
        Chunk {
            src:             vec![1; segs_len],
            tgt:             vec![1; tgt_len],
            segs:            vec![0; segs_len],
            clss:            vec![0],
            src_sent_labels: vec![0],
            text:            None,
        }
    }

    #[test]
    fn test_arrange_buffer_extraction_sorts_by_segments() {
        let buffer = vec![chunk_of(5, 1), chunk_of(2, 9), chunk_of(4, 3), chunk_of(1, 1)];
        let out = arrange_buffer(buffer, Task::Extraction, 3, None);
        let lens: Vec<Vec<usize>> = out.iter().map(|m| m.iter().map(|c| c.segs.len()).collect()).collect();
        assert_eq!(lens, vec![vec![1, 2, 4], vec![5]]);
    }

    #[test]
    fn test_arrange_buffer_generation_sorts_by_target_then_segments() {
        let buffer = vec![chunk_of(5, 2), chunk_of(3, 2), chunk_of(9, 1), chunk_of(1, 3)];
        let out = arrange_buffer(buffer, Task::Generation, 10, None);
        let keys: Vec<(usize, usize)> = out[0].iter().map(|c| (c.tgt.len(), c.segs.len())).collect();
        assert_eq!(keys, vec![(1, 9), (2, 3), (2, 5), (3, 1)]);
    }

    #[test]
    fn test_arrange_buffer_shuffle_keeps_contents() {
        let buffer: Vec<Chunk> = (1..=30).map(|l| chunk_of(l, 1)).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let out = arrange_buffer(buffer, Task::Extraction, 3, Some(&mut rng));

        assert_eq!(out.len(), 10);
        for m in &out {
            // each minibatch is still a sorted run of three lengths
            let lens: Vec<usize> = m.iter().map(|c| c.segs.len()).collect();
            assert_eq!(lens.len(), 3);
            assert!(lens.windows(2).all(|w| w[0] + 1 == w[1]));
        }
    }

    #[test]
    fn test_unshuffled_epochs_are_identical() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 3, 12);

        let s = scheduler(&prefix, config(false));
        let a: Vec<Minibatch> = s.epoch_minibatches(0).unwrap().collect::<Result<_>>().unwrap();
        let b: Vec<Minibatch> = s.epoch_minibatches(5).unwrap().collect::<Result<_>>().unwrap();

        assert!(!a.is_empty());
        assert_eq!(a, b);
        assert!(a.iter().all(|m| !m.is_empty() && m.len() <= 3));
    }

    #[test]
    fn test_shuffled_epoch_replays_from_seed() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 3, 12);

        let first  = scheduler(&prefix, config(true));
        let second = scheduler(&prefix, config(true));
        let a: Vec<Minibatch> = first.epoch_minibatches(1).unwrap().collect::<Result<_>>().unwrap();
        let b: Vec<Minibatch> = second.epoch_minibatches(1).unwrap().collect::<Result<_>>().unwrap();
        let c: Vec<Minibatch> = second.epoch_minibatches(2).unwrap().collect::<Result<_>>().unwrap();

        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_resume_skips_consumed_minibatches() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 2, 15);

        let mut full = scheduler(&prefix, config(true));
        let all = drain(full.next_epoch().unwrap());
        assert!(all.len() > 4);
        assert_eq!(full.state(), IteratorState { epoch: 1, iterations: all.len(), iterations_this_epoch: 0 });

        // Stop a run after 4 minibatches and resume it elsewhere
        let mut interrupted = scheduler(&prefix, config(true));
        let head: Vec<Minibatch> = interrupted.next_epoch().unwrap().take(4).collect::<Result<_>>().unwrap();
        let saved = interrupted.state();
        assert_eq!(saved, IteratorState { epoch: 0, iterations: 4, iterations_this_epoch: 4 });

        let mut resumed = scheduler(&prefix, config(true)).resume(saved);
        let tail = drain(resumed.next_epoch().unwrap());

        assert_eq!(fingerprint(&head), fingerprint(&all[..4]));
        assert_eq!(fingerprint(&tail), fingerprint(&all[4..]));
        assert_eq!(resumed.state().iterations, all.len());
    }

    #[test]
    fn test_resume_past_end_yields_nothing() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 1, 5);

        let state = IteratorState { epoch: 0, iterations: 10_000, iterations_this_epoch: 10_000 };
        let mut s = scheduler(&prefix, config(false)).resume(state);
        assert!(drain(s.next_epoch().unwrap()).is_empty());
        assert_eq!(s.state().epoch, 1);

        // The following epoch starts from the beginning again
        assert!(!drain(s.next_epoch().unwrap()).is_empty());
    }

    #[test]
    fn test_empty_and_malformed_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut broken = document(7, 5, 3, 2);
        broken.segs.pop();
        let docs = vec![DocumentRecord::default(), broken, document(9, 6, 3, 2)];
        std::fs::write(dir.path().join("corpus.train.0.json"), serde_json::to_string(&docs).unwrap()).unwrap();
        let prefix = dir.path().join("corpus").to_string_lossy().into_owned();

        let s = scheduler(&prefix, config(false));
        let all: Vec<Minibatch> = s.epoch_minibatches(0).unwrap().collect::<Result<_>>().unwrap();
        let firsts: Vec<i64> = all.iter().flatten().map(|c| c.src[0]).collect();
        assert!(firsts.contains(&9));
        assert!(!firsts.contains(&7));
    }

    #[test]
    fn test_missing_shard_surfaces_error_once() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("nothing").to_string_lossy().into_owned();

        let mut s = scheduler(&prefix, config(false));
        let mut epoch = s.next_epoch().unwrap();
        assert!(matches!(epoch.next(), Some(Err(_))));
        assert!(epoch.next().is_none());
        drop(epoch);
        // a failed epoch is not counted as finished
        assert_eq!(s.state().epoch, 0);
    }

    #[test]
    fn test_epoch_batches_are_tensorized() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 1, 6);

        let mut s = scheduler(&prefix, config(false));
        let batches: Vec<Batch<NdArray>> = s
            .next_epoch()
            .unwrap()
            .batches::<NdArray>(BatchTensorizer::new(12), NdArrayDevice::default())
            .collect::<Result<_>>()
            .unwrap();

        assert!(!batches.is_empty());
        for b in &batches {
            assert!(b.batch_size <= 3);
            assert!(b.src.dims()[1] <= 12);
        }
    }

    /// Delegates to the JSON loader and counts how often it is asked
    struct CountingLoader {
        loads: Rc<Cell<usize>>,
    }

    impl ShardLoader for CountingLoader {
        fn load_shard(&self, path: &Path) -> Result<Vec<DocumentRecord>> {
            self.loads.set(self.loads.get() + 1);
            JsonShardLoader.load_shard(path)
        }
    }

    #[test]
    fn test_shards_load_one_at_a_time() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 3, 10);
        let loads  = Rc::new(Cell::new(0));
        let loader = CountingLoader { loads: Rc::clone(&loads) };

        let mut s = EpochScheduler::new(config(true), ShardSource::new(prefix, Split::Train), loader);
        let mut epoch = s.next_epoch().unwrap();
        assert_eq!(loads.get(), 0);

        assert!(epoch.next().unwrap().is_ok());
        assert_eq!(loads.get(), 1);

        let rest = epoch.collect::<Result<Vec<_>>>().unwrap();
        assert!(!rest.is_empty());
        assert_eq!(loads.get(), 3);
    }

    #[test]
    fn test_generation_penalty_closes_buffers_early() {
        let dir    = tempfile::tempdir().unwrap();
        let prefix = write_corpus(dir.path(), 2, 12);

        let relaxed = PipelineConfig {
            task:                 Task::Generation,
            long_batch_threshold: 100,
            ..config(false)
        };
        let penalized = PipelineConfig { long_batch_threshold: 2, ..relaxed.clone() };

        let a: Vec<Minibatch> = scheduler(&prefix, relaxed).epoch_minibatches(0).unwrap().collect::<Result<_>>().unwrap();
        let b: Vec<Minibatch> = scheduler(&prefix, penalized).epoch_minibatches(0).unwrap().collect::<Result<_>>().unwrap();

        // Without the penalty a 40-element budget fits full minibatches of 3
        assert!(a.iter().any(|m| m.len() == 3));
        // Past 2 chunks the penalty overruns the budget, so buffers hold at most 2
        assert!(b.iter().all(|m| !m.is_empty() && m.len() <= 2));

        let chunks = |m: &[Minibatch]| m.iter().map(Vec::len).sum::<usize>();
        assert_eq!(chunks(&a), chunks(&b));

        // Each minibatch comes out of a buffer sorted by target length
        for m in a.iter().chain(&b) {
            assert!(m.windows(2).all(|w| w[0].tgt.len() <= w[1].tgt.len()));
        }
    }

    #[test]
    fn test_padding_footprint() {
        let m = vec![chunk_of(3, 1), chunk_of(5, 1)];
        assert_eq!(padding_footprint(&m, 512), (8, 10));
        assert_eq!(padding_footprint(&m, 4), (7, 8));
    }
}
