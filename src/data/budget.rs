// ============================================================
// Layer 4 — Budget Batcher
// ============================================================
// Groups a stream of chunks into minibatches by an element
// budget instead of a fixed example count.
//
// Why a budget?
//   A minibatch becomes a padded [count, longest] tensor, so its
//   memory grows with count × longest row, not with count alone.
//   The cost functions below estimate exactly that product, and
//   the batcher closes a minibatch once it reaches the target.
//
// The rule, applied after every appended chunk:
//   cost == target → emit the minibatch as it is
//   cost >  target → the last chunk overflowed: emit everything
//                    before it, start the next minibatch with it
//   input ends     → emit whatever is left
//
// Example (extraction cost, target = 12, src lengths 3 3 3 5):
//   [3]          cost 1×3 = 3
//   [3 3]        cost 2×3 = 6
//   [3 3 3]      cost 3×3 = 9
//   [3 3 3 5]    cost 4×5 = 20 > 12 → emit [3 3 3], keep [5]
//
// Each cost function owns its running maximum, so two batchers
// never disturb each other.
//
// Reference: Rust Book §13 (Iterators), §10 (Traits)

use crate::domain::{
    chunk::{Chunk, Minibatch},
    config::{PipelineConfig, Task},
    traits::BatchCost,
};

// ─── Cost Functions ───────────────────────────────────────────────────────────

/// Cost for the generation task: keyed off target length.
///
/// Minibatches longer than `threshold` chunks pay a flat
/// `penalty` so they close early.
#[derive(Debug, Clone)]
pub struct GenerationCost {
    threshold: usize,
    penalty:   usize,
    max_len:   usize,
}

impl GenerationCost {
    pub fn new(threshold: usize, penalty: usize) -> Self {
        Self { threshold, penalty, max_len: 0 }
    }
}

impl BatchCost for GenerationCost {
    fn cost(&mut self, chunk: &Chunk, count: usize) -> usize {
        if count == 1 {
            self.max_len = 0;
        }
        self.max_len = self.max_len.max(chunk.tgt.len());

        let elements = count * self.max_len;
        if count > self.threshold {
            elements + self.penalty
        } else {
            elements
        }
    }
}

/// Cost for the extraction task: keyed off source length.
#[derive(Debug, Clone, Default)]
pub struct ExtractionCost {
    max_len: usize,
}

impl ExtractionCost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchCost for ExtractionCost {
    fn cost(&mut self, chunk: &Chunk, count: usize) -> usize {
        if count == 1 {
            self.max_len = 0;
        }
        self.max_len = self.max_len.max(chunk.src.len());
        count * self.max_len
    }
}

/// Pick the cost function for the configured task
pub fn cost_for(cfg: &PipelineConfig) -> Box<dyn BatchCost> {
    match cfg.task {
        Task::Generation => Box::new(GenerationCost::new(
            cfg.long_batch_threshold,
            cfg.long_batch_penalty,
        )),
        Task::Extraction => Box::new(ExtractionCost::new()),
    }
}

// ─── BudgetBatcher ────────────────────────────────────────────────────────────
/// Iterator adapter turning chunks into budget-bounded minibatches.
pub struct BudgetBatcher<I, C> {
    chunks:    I,
    target:    usize,
    cost:      C,
    minibatch: Minibatch,
}

impl<I, C> BudgetBatcher<I, C>
where
    I: Iterator<Item = Chunk>,
    C: BatchCost,
{
    pub fn new(chunks: I, target: usize, cost: C) -> Self {
        Self {
            chunks,
            target,
            cost,
            minibatch: Vec::new(),
        }
    }
}

impl<I, C> Iterator for BudgetBatcher<I, C>
where
    I: Iterator<Item = Chunk>,
    C: BatchCost,
{
    type Item = Minibatch;

    fn next(&mut self) -> Option<Minibatch> {
        while let Some(chunk) = self.chunks.next() {
            let size = self.cost.cost(&chunk, self.minibatch.len() + 1);
            self.minibatch.push(chunk);

            if size == self.target {
                return Some(std::mem::take(&mut self.minibatch));
            }

            if size > self.target {
                // Roll the overflowing chunk over into a fresh minibatch
                let Some(last) = self.minibatch.pop() else { continue };
                let full = std::mem::take(&mut self.minibatch);
                self.cost.cost(&last, 1);
                self.minibatch.push(last);

                // A lone chunk over budget leaves nothing to emit yet
                if !full.is_empty() {
                    return Some(full);
                }
            }
        }

        if self.minibatch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.minibatch))
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(src_len: usize, tgt_len: usize) -> Chunk {
        Chunk {
            src:             vec![1; src_len],
            tgt:             vec![1; tgt_len],
            segs:            vec![0; src_len],
            clss:            vec![0],
            src_sent_labels: vec![1],
            text:            None,
        }
    }

    fn src_lens(batches: &[Minibatch]) -> Vec<Vec<usize>> {
        batches
            .iter()
            .map(|b| b.iter().map(|c| c.src.len()).collect())
            .collect()
    }

    /// Recompute a minibatch's cost from scratch with a fresh cost function
    fn recompute<C: BatchCost>(mut cost: C, batch: &Minibatch) -> usize {
        batch
            .iter()
            .enumerate()
            .map(|(i, c)| cost.cost(c, i + 1))
            .last()
            .unwrap_or(0)
    }

    #[test]
    fn test_overflow_rolls_last_chunk_over() {
        let chunks  = vec![chunk(3, 1), chunk(3, 1), chunk(3, 1), chunk(5, 1)];
        let batches: Vec<_> = BudgetBatcher::new(chunks.into_iter(), 12, ExtractionCost::new()).collect();
        assert_eq!(src_lens(&batches), vec![vec![3, 3, 3], vec![5]]);
    }

    #[test]
    fn test_exact_target_closes_batch() {
        let chunks  = vec![chunk(4, 1), chunk(4, 1), chunk(2, 1), chunk(2, 1)];
        let batches: Vec<_> = BudgetBatcher::new(chunks.into_iter(), 8, ExtractionCost::new()).collect();
        assert_eq!(src_lens(&batches), vec![vec![4, 4], vec![2, 2]]);
    }

    #[test]
    fn test_oversized_single_chunk_gets_own_batch() {
        let chunks  = vec![chunk(50, 1), chunk(2, 1), chunk(2, 1)];
        let batches: Vec<_> = BudgetBatcher::new(chunks.into_iter(), 10, ExtractionCost::new()).collect();
        assert_eq!(src_lens(&batches), vec![vec![50], vec![2, 2]]);
        assert!(batches.iter().all(|b| !b.is_empty()));
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let mut b = BudgetBatcher::new(Vec::<Chunk>::new().into_iter(), 10, ExtractionCost::new());
        assert!(b.next().is_none());
    }

    #[test]
    fn test_generation_cost_uses_target_and_penalty() {
        let mut cost = GenerationCost::new(2, 1000);
        assert_eq!(cost.cost(&chunk(100, 4), 1), 4);
        assert_eq!(cost.cost(&chunk(100, 6), 2), 12);
        assert_eq!(cost.cost(&chunk(100, 1), 3), 18 + 1000);
        // count == 1 resets the running maximum
        assert_eq!(cost.cost(&chunk(100, 1), 1), 1);
    }

    #[test]
    fn test_separate_batchers_do_not_share_state() {
        let mut a = ExtractionCost::new();
        let mut b = ExtractionCost::new();
        a.cost(&chunk(40, 1), 1);
        assert_eq!(b.cost(&chunk(2, 1), 1), 2);
        assert_eq!(a.cost(&chunk(2, 1), 2), 80);
    }

    #[test]
    fn test_emitted_batches_stay_within_budget() {
        let lens: Vec<usize> = (0..300).map(|i| 1 + (i * 37) % 23).collect();
        let chunks: Vec<Chunk> = lens.iter().map(|&l| chunk(l, 1)).collect();
        let target = 60;
        let batches: Vec<_> = BudgetBatcher::new(chunks.into_iter(), target, ExtractionCost::new()).collect();

        let last = batches.len() - 1;
        for (i, batch) in batches.iter().enumerate() {
            let cost = recompute(ExtractionCost::new(), batch);
            assert!(cost <= target || batch.len() == 1 || i == last);
        }

        // Nothing is lost or reordered
        let flat: Vec<usize> = batches.iter().flatten().map(|c| c.src.len()).collect();
        assert_eq!(flat, lens);
    }
}
