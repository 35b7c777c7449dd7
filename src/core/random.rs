//! A wrapper for the random generator used during training.
//!
//! Every training run owns one explicitly seeded instance so that
//! concurrent or repeated trainings in one process never interfere and
//! runs are reproducible from the seed alone.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Seeded random generator owned by a training run.
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Constructor, with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Random {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a random float in `[0.0, 1.0)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Generate a random integer in `[0, upper_bound)`.
    pub fn below(&mut self, upper_bound: usize) -> usize {
        self.rng.gen_range(0..upper_bound)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        values.shuffle(&mut self.rng);
    }

    /// Sample `k` ordered indices without replacement from `{0, .., n-1}`.
    ///
    /// Returns all indices when `k >= n` and an empty vector when `k == 0`.
    pub fn sample(&mut self, n: usize, k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        if k >= n {
            return (0..n).collect();
        }
        let mut idx: Vec<usize> = (0..n).collect();
        idx.shuffle(&mut self.rng);
        let mut picked: Vec<usize> = idx.into_iter().take(k).collect();
        picked.sort_unstable();
        picked
    }
}
