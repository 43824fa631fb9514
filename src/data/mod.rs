// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between shard files on disk and tensor batches.
//
// The pipeline flows in this order:
//
//   shard files
//       │
//       ▼
//   ShardSource        → lists a split's shards, loads one at a time
//       │
//       ▼
//   WindowChunker      → cuts each record into position-bounded windows
//       │
//       ▼
//   BudgetBatcher      → groups windows into budget-sized buffers
//       │
//       ▼
//   EpochScheduler     → sorts buffers, cuts minibatches, shuffles,
//       │                resumes mid-epoch
//       ▼
//   BatchTensorizer    → pads minibatches into Burn tensors
//
// DocumentScheduler replaces the budget and sorting stages for
// test mode, where windows stay grouped by document.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Shard enumeration and JSON shard loading
pub mod loader;

/// Splits records into sentence-aligned windows
pub mod chunker;

/// Element-budget minibatching and cost functions
pub mod budget;

/// Seeded generators for reproducible shuffles
pub mod shuffler;

/// Epoch orchestration and resume
pub mod scheduler;

/// Per-document batching for test mode
pub mod document_scheduler;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
