//! Seeded random generator passed explicitly through the pipeline.
//!
//! There is no ambient global generator: the run owns one [`SplicerRng`],
//! and per-source generators are derived from it with [`SplicerRng::next_seed`]
//! in submission order, before any parallel work is dispatched.
//!
//! The algorithm is pinned to ChaCha8: a seed recorded in a manifest must
//! produce the same stream under any `rand` release.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeds are kept to 31 bits so they survive any JSON consumer intact.
pub const MAX_SEED: u64 = i32::MAX as u64;

#[derive(Debug, Clone)]
pub struct SplicerRng {
    inner: ChaCha8Rng,
}

impl SplicerRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fresh seed from OS entropy, for runs without a configured seed.
    pub fn random_seed() -> u64 {
        rand::rng().random_range(0..=MAX_SEED)
    }

    /// Draw a seed for a child generator.
    pub fn next_seed(&mut self) -> u64 {
        self.inner.random_range(0..=MAX_SEED)
    }

    /// Uniform draw from the inclusive range `[min, max]`.
    ///
    /// Panics if `min > max`; callers take both from a validated config.
    pub fn draw_frames(&mut self, min: u32, max: u32) -> u32 {
        self.inner.random_range(min..=max)
    }

    /// Uniform insertion index over `[0, len]`, both ends allowed.
    pub fn insertion_position(&mut self, len: usize) -> usize {
        self.inner.random_range(0..=len)
    }

    /// Uniform in-place permutation.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}
