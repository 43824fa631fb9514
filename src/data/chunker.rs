// ============================================================
// Layer 4 — Window Chunker
// ============================================================
// Splits one document record into sentence-aligned windows
// that fit the model's position limit (max_pos).
//
// Why windows instead of plain truncation?
//   A summarization document usually has far more tokens than
//   the encoder has positions. Cutting the tail would throw
//   away most sentences and their labels. Instead the document
//   is cut into several windows, each a contiguous run of whole
//   sentences, and each window is a separate model input.
//
// The sliding rule (two sentence cursors lo < hi):
//   grow hi while the span clss[hi] - clss[lo] fits in max_pos;
//   once it does not, close the window on sentences [lo, hi-1)
//   and move lo forward.
//
// Example with clss = [0, 5, 9, 14] and max_pos = 10:
//   hi=1  span 5   fits
//   hi=2  span 9   fits
//   hi=3  span 14  too long → window = sentences 0..2, clss [0, 5]
//   lo moves to 2, hi reaches the end, the tail 2..4 is dropped
//
// Train vs test:
//   train → the trailing partial window is dropped, lo may move
//           by only a fraction of the window (augmentation)
//   test  → the trailing window is always emitted and any window
//           still longer than max_pos is truncated so that every
//           sentence of the document gets a prediction
//
// Reference: Rust Book §8 (Slices), §13 (Iterators)

use crate::domain::{
    chunk::{Chunk, ChunkText},
    config::PipelineConfig,
    record::DocumentRecord,
};

/// Whether windows are cut for training or for evaluation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    Train,
    Test,
}

/// Cuts document records into position-bounded windows.
#[derive(Debug, Clone)]
pub struct WindowChunker {
    max_pos:      usize,
    max_tgt_len:  usize,
    tgt_eos_id:   i64,
    use_interval: bool,
    /// Divisor of the window length that lo advances by (train only)
    augmentation: Option<usize>,
    mode:         ChunkMode,
}

impl WindowChunker {
    /// Create a train-mode chunker with non-overlapping windows.
    ///
    /// # Panics
    /// Panics if max_pos < 2: a window needs room for at least
    /// one token plus the forced end token in test mode.
    pub fn new(max_pos: usize, max_tgt_len: usize) -> Self {
        assert!(max_pos >= 2, "max_pos ({}) must be at least 2", max_pos);
        Self {
            max_pos,
            max_tgt_len,
            tgt_eos_id:   2,
            use_interval: true,
            augmentation: None,
            mode:         ChunkMode::Train,
        }
    }

    /// Build a chunker from the pipeline configuration
    pub fn from_config(cfg: &PipelineConfig, mode: ChunkMode) -> Self {
        Self::new(cfg.max_pos, cfg.max_tgt_len)
            .with_eos(cfg.tgt_eos_id)
            .with_interval(cfg.use_interval)
            .with_augmentation(cfg.augmentation_number)
            .with_mode(mode)
    }

    pub fn with_eos(mut self, tgt_eos_id: i64) -> Self {
        self.tgt_eos_id = tgt_eos_id;
        self
    }

    pub fn with_interval(mut self, use_interval: bool) -> Self {
        self.use_interval = use_interval;
        self
    }

    pub fn with_augmentation(mut self, augmentation: Option<usize>) -> Self {
        // a zero divisor would never be a valid overlap
        self.augmentation = augmentation.filter(|&k| k > 0);
        self
    }

    pub fn with_mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Cut the target to max_tgt_len, drop its last token and
    /// terminate it with the end marker.
    ///
    ///   [1 5 6 7 8 2], max_tgt_len=4 → [1 5 6] + [2]
    pub fn prepare_target(&self, tgt: &[i64]) -> Vec<i64> {
        let kept = tgt.len().min(self.max_tgt_len).saturating_sub(1);
        let mut out = Vec::with_capacity(kept + 1);
        out.extend_from_slice(&tgt[..kept]);
        out.push(self.tgt_eos_id);
        out
    }

    /// Lazily iterate over the windows of `record`.
    /// Every call starts again from the first sentence.
    pub fn windows<'a>(&'a self, record: &'a DocumentRecord) -> Windows<'a> {
        Windows {
            chunker:       self,
            record,
            tgt:           self.prepare_target(&record.tgt),
            lo:            0,
            hi:            1,
            trailing_done: false,
        }
    }

    /// Collect all windows of `record` into owned chunks
    pub fn chunk(&self, record: &DocumentRecord) -> Vec<Chunk> {
        self.windows(record).collect()
    }

    /// Where lo moves to after closing the window [lo, end)
    fn advance(&self, lo: usize, end: usize) -> usize {
        match (self.mode, self.augmentation) {
            (ChunkMode::Train, Some(k)) => lo + (end - lo) / k,
            _ => end,
        }
    }
}

// ─── Windows Iterator ─────────────────────────────────────────────────────────
/// Iterator over the windows of one record, see [`WindowChunker::windows`].
pub struct Windows<'a> {
    chunker:       &'a WindowChunker,
    record:        &'a DocumentRecord,
    /// Prepared once per record, cloned into every chunk
    tgt:           Vec<i64>,
    lo:            usize,
    hi:            usize,
    trailing_done: bool,
}

impl<'a> Windows<'a> {
    /// Build the chunk for sentences [lo, end) whose tokens stop at token_end
    fn build(&self, lo: usize, end: usize, token_end: usize) -> Chunk {
        let rec     = self.record;
        let max_pos = self.chunker.max_pos;

        let start     = rec.clss[lo].min(rec.src.len());
        let token_end = token_end.clamp(start, rec.src.len());

        let mut src = rec.src[start..token_end].to_vec();
        let mut segs = if self.chunker.use_interval {
            rec.segs[start..token_end.min(rec.segs.len())].to_vec()
        } else {
            vec![0; src.len()]
        };

        // Re-base sentence starts so the window begins at position 0
        let mut clss: Vec<i64> = rec.clss[lo..end]
            .iter()
            .map(|&c| c.saturating_sub(rec.clss[lo]) as i64)
            .collect();
        let mut labels =
            rec.src_sent_labels[lo.min(rec.src_sent_labels.len())..end.min(rec.src_sent_labels.len())].to_vec();

        if self.chunker.mode == ChunkMode::Test && src.len() > max_pos {
            // The document's final token is its closing marker
            let end_id = rec.src.last().copied().unwrap_or(self.chunker.tgt_eos_id);
            src.truncate(max_pos - 1);
            src.push(end_id);
            segs.truncate(max_pos);

            // Lower bound: first sentence that starts at or past max_pos
            let keep = clss.partition_point(|&c| c < max_pos as i64);
            clss.truncate(keep);
            labels.truncate(keep);
        }

        let text = match self.chunker.mode {
            ChunkMode::Test => Some(ChunkText {
                src_txt: rec.src_txt.clone(),
                tgt_txt: rec.tgt_txt.clone(),
            }),
            ChunkMode::Train => None,
        };

        Chunk {
            src,
            tgt: self.tgt.clone(),
            segs,
            clss,
            src_sent_labels: labels,
            text,
        }
    }
}

impl<'a> Iterator for Windows<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let clss    = &self.record.clss;
        let n       = clss.len();
        let max_pos = self.chunker.max_pos;

        while self.hi < n {
            let hi = self.hi;
            self.hi += 1;

            if clss[hi].saturating_sub(clss[self.lo]) > max_pos {
                let lo  = self.lo;
                let end = hi - 1;
                self.lo = self.chunker.advance(lo, end);

                // A single sentence longer than max_pos sits at lo:
                // the window would hold no sentence at all.
                if end == lo {
                    continue;
                }
                return Some(self.build(lo, end, clss[end]));
            }
        }

        if self.chunker.mode == ChunkMode::Test && !self.trailing_done {
            self.trailing_done = true;
            if n > 0 && self.lo < n - 1 {
                return Some(self.build(self.lo, n, self.record.src.len()));
            }
        }

        None
    }
}
