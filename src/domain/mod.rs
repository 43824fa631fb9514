// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that name the core
// concepts of the pipeline:
//
//   DocumentRecord → what a shard stores
//   Chunk          → one window of a record
//   PipelineConfig → every knob the pipeline reads
//   traits         → the seams (shard loading, batch cost)
//
// Rules for this layer:
//   - NO Burn types
//   - NO file I/O
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A pre-tokenized document loaded from a shard
pub mod record;

// A window of a document, the unit the batcher consumes
pub mod chunk;

// Pipeline configuration, task and split names
pub mod config;

// Core abstractions that other layers implement
pub mod traits;
