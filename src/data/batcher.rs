// ============================================================
// Layer 4 — Batch Tensorizer
// ============================================================
// Implements Burn's Batcher trait to turn a minibatch of
// variable-length chunks into fixed-shape padded tensors.
//
// How padding works here:
//   Input:  N chunks, each field a sequence of its own length
//   Output: one [N, W] tensor per field, where W is the longest
//           row of that field in the minibatch, capped at max_pos
//
//   src row lengths 3, 5, 2  →  W = 5
//     [a b c 0 0]
//     [d e f g h]
//     [i j 0 0 0]
//
// Masks are derived from the padded values:
//   mask_src / mask_tgt → value != 0
//   mask_cls            → value != -1  (clss is padded with -1
//                         because 0 is a real sentence offset)
// After mask_cls is built the -1 cells are reset to 0 so no
// negative index ever reaches a gather downstream.
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::chunk::Chunk;

/// Pad value for token, segment and label fields
pub const PAD_ID: i64 = 0;

/// Pad value for sentence offsets before mask derivation
pub const CLS_PAD: i64 = -1;

// ─── Batch ────────────────────────────────────────────────────────────────────
/// A tensorized minibatch. Every 2D tensor has batch_size rows.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// Source tokens — [batch_size, src_len]
    pub src: Tensor<B, 2, Int>,

    /// Target tokens — [batch_size, tgt_len]
    pub tgt: Tensor<B, 2, Int>,

    /// Segment ids — [batch_size, src_len]
    pub segs: Tensor<B, 2, Int>,

    /// Sentence start offsets, padding reset to 0 — [batch_size, n_sents]
    pub clss: Tensor<B, 2, Int>,

    /// Sentence labels — [batch_size, n_sents]
    pub src_sent_labels: Tensor<B, 2, Int>,

    /// true = real token
    pub mask_src: Tensor<B, 2, Bool>,

    /// true = real target token
    pub mask_tgt: Tensor<B, 2, Bool>,

    /// true = real sentence
    pub mask_cls: Tensor<B, 2, Bool>,

    pub batch_size: usize,

    /// Test mode only: source sentences of each chunk's document
    pub src_str: Option<Vec<Vec<String>>>,

    /// Test mode only: target text of each chunk's document
    pub tgt_str: Option<Vec<String>>,
}

impl<B: Backend> Batch<B> {
    pub fn len(&self) -> usize {
        self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.batch_size == 0
    }
}

// ─── Padding ──────────────────────────────────────────────────────────────────
/// Rows of one field, right-padded to a common width and flattened
/// row-major, ready for `Tensor::from_ints(..).reshape([rows, width])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedField {
    pub values: Vec<i64>,
    pub rows:   usize,
    pub width:  usize,
}

/// Pad every row to the longest row (at most `max_width`) with `pad`.
/// Rows longer than `max_width` are cut.
///
/// The width never drops below 1 so that a minibatch of empty
/// rows still produces a valid tensor shape.
pub fn pad_rows<'a, I>(rows: I, pad: i64, max_width: usize) -> PaddedField
where
    I: IntoIterator<Item = &'a [i64]>,
    I::IntoIter: Clone,
{
    let rows  = rows.into_iter();
    let width = rows
        .clone()
        .map(<[i64]>::len)
        .max()
        .unwrap_or(0)
        .min(max_width)
        .max(1);

    let mut values = Vec::new();
    let mut count  = 0usize;
    for row in rows {
        let kept = row.len().min(width);
        values.extend_from_slice(&row[..kept]);
        values.extend(std::iter::repeat(pad).take(width - kept));
        count += 1;
    }

    PaddedField { values, rows: count, width }
}

// ─── BatchTensorizer ──────────────────────────────────────────────────────────
/// Holds the position limit that caps every padded width.
#[derive(Clone, Debug)]
pub struct BatchTensorizer {
    pub max_pos: usize,
}

impl BatchTensorizer {
    pub fn new(max_pos: usize) -> Self {
        Self { max_pos }
    }

    /// Pad one field of every chunk
    fn pad_field<F>(&self, items: &[Chunk], field: F, pad: i64) -> PaddedField
    where
        F: Fn(&Chunk) -> &[i64] + Clone,
    {
        pad_rows(items.iter().map(field), pad, self.max_pos)
    }

    fn to_tensor<B: Backend>(field: &PaddedField, device: &B::Device) -> Tensor<B, 2, Int> {
        Tensor::<B, 1, Int>::from_ints(field.values.as_slice(), device)
            .reshape([field.rows, field.width])
    }

    /// Build a Batch from a minibatch of chunks.
    pub fn tensorize<B: Backend>(&self, items: &[Chunk], device: &B::Device) -> Batch<B> {
        let src    = Self::to_tensor::<B>(&self.pad_field(items, |c| c.src.as_slice(), PAD_ID), device);
        let tgt    = Self::to_tensor::<B>(&self.pad_field(items, |c| c.tgt.as_slice(), PAD_ID), device);
        let segs   = Self::to_tensor::<B>(&self.pad_field(items, |c| c.segs.as_slice(), PAD_ID), device);
        let labels = Self::to_tensor::<B>(&self.pad_field(items, |c| c.src_sent_labels.as_slice(), PAD_ID), device);
        let clss   = Self::to_tensor::<B>(&self.pad_field(items, |c| c.clss.as_slice(), CLS_PAD), device);

        let mask_src = src.clone().not_equal_elem(PAD_ID);
        let mask_tgt = tgt.clone().not_equal_elem(PAD_ID);
        let mask_cls = clss.clone().not_equal_elem(CLS_PAD);

        // Sentinel cells become 0 only after the mask has seen them
        let clss = clss.mask_fill(mask_cls.clone().bool_not(), 0);

        // Text travels only when every chunk came from test mode
        let texts: Option<Vec<_>> = items.iter().map(|c| c.text.as_ref()).collect();
        let (src_str, tgt_str) = match texts {
            Some(texts) if !texts.is_empty() => (
                Some(texts.iter().map(|t| t.src_txt.clone()).collect()),
                Some(texts.iter().map(|t| t.tgt_txt.clone()).collect()),
            ),
            _ => (None, None),
        };

        Batch {
            src,
            tgt,
            segs,
            clss,
            src_sent_labels: labels,
            mask_src,
            mask_tgt,
            mask_cls,
            batch_size: items.len(),
            src_str,
            tgt_str,
        }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<B, Chunk, Batch<B>> for BatchTensorizer {
    fn batch(&self, items: Vec<Chunk>, device: &B::Device) -> Batch<B> {
        self.tensorize(&items, device)
    }
}
