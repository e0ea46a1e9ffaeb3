//! Randomness used to choose reviewers.
//!
//! The engine never touches a process-wide generator; it is handed a
//! `ReviewerPicker` so tests can make selection reproducible.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::User;

pub trait ReviewerPicker: Send + Sync {
    /// Reorder `candidates` into a uniformly random permutation.
    fn shuffle(&self, candidates: &mut [User]);

    /// A uniformly random index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// `StdRng`-backed picker.
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A picker that yields the same sequence for the same seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // The generator stays usable after a panic in another holder
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl ReviewerPicker for RandomPicker {
    fn shuffle(&self, candidates: &mut [User]) {
        self.with_rng(|rng| candidates.shuffle(rng));
    }

    fn pick(&self, len: usize) -> usize {
        self.with_rng(|rng| rng.gen_range(0..len))
    }
}
