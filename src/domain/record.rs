// ============================================================
// Layer 3 — DocumentRecord Domain Type
// ============================================================
// One pre-tokenized document as stored inside a shard.
//
// Layout of a record:
//   src              [t0 t1 t2 t3 t4 t5 t6 t7 t8 ...]   token ids
//   segs             [ 0  0  0  1  1  1  1  0  0 ...]   one per token
//   clss             [ 0        3           7     ...]   sentence starts
//   src_sent_labels  [ 1        0           1     ...]   one per sentence
//   tgt              [ 1 ... 2 ]                         summary token ids
//
// A record is immutable once loaded. It lives as long as
// the shard it came from and is dropped with it.
//
// Reference: Rust Book §5 (Structs and Methods)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A pre-tokenized document: flattened source tokens plus the
/// sentence boundaries and labels needed to window it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Source token ids, flattened across all sentences
    pub src: Vec<i64>,

    /// Target summary token ids
    pub tgt: Vec<i64>,

    /// Segment (interval) id for every source token
    pub segs: Vec<i64>,

    /// Offset into `src` where each sentence starts
    pub clss: Vec<usize>,

    /// Extractive label for each sentence (0 or 1)
    pub src_sent_labels: Vec<i64>,

    /// Original source sentences, only reported in test mode
    #[serde(default)]
    pub src_txt: Vec<String>,

    /// Original target text, only reported in test mode
    #[serde(default)]
    pub tgt_txt: String,
}

impl DocumentRecord {
    /// Number of sentences in the document
    pub fn num_sentences(&self) -> usize {
        self.clss.len()
    }

    /// Check the structural invariants a record must satisfy
    /// before it can be windowed.
    ///
    /// Returns an error naming the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.segs.len() != self.src.len() {
            bail!(
                "segs has {} entries but src has {} tokens",
                self.segs.len(),
                self.src.len()
            );
        }

        if self.src_sent_labels.len() != self.clss.len() {
            bail!(
                "src_sent_labels has {} entries but clss has {} sentences",
                self.src_sent_labels.len(),
                self.clss.len()
            );
        }

        // windows() is strictly increasing iff every adjacent pair is
        if let Some(pair) = self.clss.windows(2).find(|w| w[0] >= w[1]) {
            bail!("clss is not strictly increasing at {:?}", pair);
        }

        if let Some(&last) = self.clss.last() {
            if last >= self.src.len() {
                bail!(
                    "sentence offset {} is outside src of length {}",
                    last,
                    self.src.len()
                );
            }
        }

        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DocumentRecord {
        DocumentRecord {
            src:             vec![101, 5, 6, 102, 101, 7, 102],
            tgt:             vec![1, 9, 9, 2],
            segs:            vec![0, 0, 0, 0, 1, 1, 1],
            clss:            vec![0, 4],
            src_sent_labels: vec![1, 0],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(record().validate().is_ok());
        assert_eq!(record().num_sentences(), 2);
    }

    #[test]
    fn test_segs_length_mismatch_is_rejected() {
        let mut r = record();
        r.segs.pop();
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_label_count_mismatch_is_rejected() {
        let mut r = record();
        r.src_sent_labels.push(0);
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_non_increasing_clss_is_rejected() {
        let mut r = record();
        r.clss = vec![4, 4];
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_offset_outside_src_is_rejected() {
        let mut r = record();
        r.clss = vec![0, 7];
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_text_fields_default_when_missing() {
        let json = r#"{"src":[1],"tgt":[2],"segs":[0],"clss":[0],"src_sent_labels":[1]}"#;
        let r: DocumentRecord = serde_json::from_str(json).unwrap();
        assert!(r.src_txt.is_empty());
        assert_eq!(r.tgt_txt, "");
    }
}
