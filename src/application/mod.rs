// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the pipeline stages together for one
// specific goal, and nothing more.
//
// Rules for this layer:
//   - No windowing or batching logic here (that's Layer 4)
//   - No printing here (that's Layer 1)
//   - No direct file formats (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Epoch after epoch of budget-packed training minibatches
pub mod batch_use_case;

// One pass (or a fixed number of documents) of the test iterator
pub mod document_use_case;
