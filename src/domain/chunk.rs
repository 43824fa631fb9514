// ============================================================
// Layer 3 — Chunk Domain Type
// ============================================================
// A Chunk is one window of a document: a contiguous run of
// sentences that fits inside the model's position limit.
//
// Every coordinate inside a chunk is LOCAL to the window:
//   document clss: [0, 5, 9, 14]
//   window over sentences 1..3 → clss [0, 4]  (5-5, 9-5)
//
// Chunks are short-lived. The chunker creates them, the
// budget batcher groups them, and the tensorizer consumes
// them. Nothing holds on to a chunk after that.
//
// Reference: Rust Book §5 (Structs), §4 (Ownership)

/// Raw text carried alongside a chunk in test mode so that
/// predictions can be reported against the original document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkText {
    /// All source sentences of the document the chunk came from
    pub src_txt: Vec<String>,

    /// Target summary text of that document
    pub tgt_txt: String,
}

/// One window of a document plus its target and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Source tokens covered by the window
    pub src: Vec<i64>,

    /// Prepared target (truncated, end-marker terminated)
    pub tgt: Vec<i64>,

    /// Segment ids for the window's tokens
    pub segs: Vec<i64>,

    /// Sentence starts, re-based so the first is 0
    pub clss: Vec<i64>,

    /// Labels for the sentences inside the window
    pub src_sent_labels: Vec<i64>,

    /// Present only for chunks produced in test mode
    pub text: Option<ChunkText>,
}

/// A group of chunks that will become one tensor batch.
pub type Minibatch = Vec<Chunk>;
