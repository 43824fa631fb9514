// ============================================================
// Layer 4 — Seeded Shuffler
// ============================================================
// Hands out the random number generators the scheduler
// shuffles with.
//
// Why not thread_rng()?
//   Resuming an epoch means regenerating its batch order from
//   scratch and skipping what was already trained on. That only
//   lands on the right batch if every shuffle of the epoch
//   replays exactly. So every generator here is derived from
//   (seed, epoch, stream) and nothing else.
//
// Streams:
//   shard order        → one generator per epoch
//   shard contents #i  → one generator per loaded shard, used for
//                        document order and minibatch order
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom
// on a StdRng seeded with seed_from_u64.
//
// Reference: rand crate documentation

use rand::{rngs::StdRng, SeedableRng};

/// Stream id reserved for the shard order of an epoch
const SHARD_ORDER_STREAM: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shuffler {
    seed: u64,
}

impl Shuffler {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Generator for the order of the shards in `epoch`
    pub fn shard_order(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(mix(self.seed, epoch as u64, SHARD_ORDER_STREAM))
    }

    /// Generator for the contents of the shard at `position`
    /// in the epoch's (possibly shuffled) shard order
    pub fn shard_contents(&self, epoch: usize, position: usize) -> StdRng {
        StdRng::seed_from_u64(mix(self.seed, epoch as u64, position as u64))
    }
}

/// splitmix64 finaliser over the three inputs
fn mix(seed: u64, epoch: u64, stream: u64) -> u64 {
    let mut z = seed
        ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ stream.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
