// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file handling that no pipeline stage owns:
//
//   checkpoint.rs — Progress persistence
//                   Saves the scheduler's IteratorState and the
//                   run's PipelineConfig as JSON so an interrupted
//                   run resumes on the same minibatch.
//
//   metrics.rs    — Batch statistics
//                   Appends per-epoch packing statistics (token
//                   counts, padding fill ratio) to a CSV file.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Progress and configuration persistence
pub mod checkpoint;

/// Per-epoch batch statistics CSV logger
pub mod metrics;
