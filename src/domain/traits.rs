// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams of the pipeline:
//
//   ShardLoader → how a shard file turns into document records.
//                 The on-disk format is not the pipeline's concern,
//                 so the scheduler only ever sees this trait.
//
//   BatchCost   → how "big" a growing minibatch is. The budget
//                 batcher closes a minibatch when this estimate
//                 reaches its target.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::chunk::Chunk;
use crate::domain::record::DocumentRecord;

// ─── ShardLoader ──────────────────────────────────────────────────────────────
/// Anything that can read one shard file into memory.
///
/// Implementations:
///   - JsonShardLoader → a JSON array of records per file
pub trait ShardLoader {
    /// Load every record stored in the shard at `path`.
    fn load_shard(&self, path: &Path) -> Result<Vec<DocumentRecord>>;
}

// ─── BatchCost ────────────────────────────────────────────────────────────────
/// Estimates the size of a minibatch as chunks are appended.
///
/// `count` is the number of chunks in the minibatch AFTER
/// `chunk` was appended. Implementations keep running state
/// across calls and must reset it when `count == 1`.
pub trait BatchCost {
    fn cost(&mut self, chunk: &Chunk, count: usize) -> usize;
}

impl<C: BatchCost + ?Sized> BatchCost for Box<C> {
    fn cost(&mut self, chunk: &Chunk, count: usize) -> usize {
        (**self).cost(chunk, count)
    }
}
