//! Weighted choice over keyed options.
//!
//! The caller supplies the RNG, so results are reproducible from a seed.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Options with non-negative integer weights. Zero-weight options are never
/// stored and so can never be chosen.
#[derive(Debug, Clone)]
pub struct WeightedOptions<K> {
    keys: Vec<K>,
    weights: Vec<u32>,
}

impl<K> Default for WeightedOptions<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            weights: Vec::new(),
        }
    }
}

impl<K: PartialEq> WeightedOptions<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight of `key`; a zero weight removes it.
    pub fn set(&mut self, key: K, weight: u32) {
        let existing = self.keys.iter().position(|k| *k == key);
        match (existing, weight) {
            (Some(i), 0) => {
                self.keys.remove(i);
                self.weights.remove(i);
            }
            (Some(i), w) => self.weights[i] = w,
            (None, 0) => {}
            (None, w) => {
                self.keys.push(key);
                self.weights.push(w);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.iter().map(|&w| w as u64).sum()
    }

    /// Pick one key with probability proportional to its weight.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&K> {
        if self.keys.is_empty() {
            return None;
        }
        let dist = WeightedIndex::new(&self.weights).ok()?;
        self.keys.get(dist.sample(rng))
    }
}
