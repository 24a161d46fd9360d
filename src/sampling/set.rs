//! Unordered id set with O(1) insert, erase, and uniform sampling

use std::fmt::Debug;
use std::hash::Hash;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::rng::SimRng;

/// Blanket bound for anything storable in the sampling structures.
pub trait SetItem: Copy + Eq + Hash + Debug {}
impl<T: Copy + Eq + Hash + Debug> SetItem for T {}

/// Set of ids backed by a dense vector plus an id-to-slot index.
///
/// Erasure swap-removes from the dense vector, so `sample_uniform` is a
/// single index draw and every live member is equally likely regardless of
/// insertion or removal history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalSet<T: SetItem> {
    items: Vec<T>,
    #[serde(skip)]
    slots: AHashMap<T, usize>,
}

impl<T: SetItem> Default for CategoricalSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SetItem> CategoricalSet<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            slots: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.slots.contains_key(item)
    }

    /// Returns true if the element was not already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.slots.contains_key(&item) {
            return false;
        }
        self.slots.insert(item, self.items.len());
        self.items.push(item);
        true
    }

    /// Returns true if the element was present.
    pub fn erase(&mut self, item: &T) -> bool {
        let Some(slot) = self.slots.remove(item) else {
            return false;
        };
        self.items.swap_remove(slot);
        if slot < self.items.len() {
            self.slots.insert(self.items[slot], slot);
        }
        true
    }

    pub fn sample_uniform(&self, rng: &mut SimRng) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items[rng.uniform_index(self.items.len())])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Rebuild the slot index from the dense vector. Needed after
    /// deserialization, where only the dense vector is stored.
    pub fn rebuild_index(&mut self) {
        self.slots = self
            .items
            .iter()
            .enumerate()
            .map(|(slot, item)| (*item, slot))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_erase_contains() {
        let mut set = CategoricalSet::new();
        assert!(set.insert(3u32));
        assert!(set.insert(7));
        assert!(!set.insert(3), "duplicate insert must be rejected");
        assert_eq!(set.len(), 2);
        assert!(set.contains(&7));
        assert!(set.erase(&3));
        assert!(!set.erase(&3), "double erase must be rejected");
        assert!(!set.contains(&3));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn swap_remove_keeps_index_consistent() {
        let mut set = CategoricalSet::new();
        for i in 0..100u32 {
            set.insert(i);
        }
        // Erase from the middle so tail elements are relocated.
        for i in (0..100).step_by(3) {
            set.erase(&i);
        }
        for i in 0..100u32 {
            assert_eq!(set.contains(&i), i % 3 != 0);
        }
        // Every survivor must still be erasable through the index.
        for i in 0..100u32 {
            if i % 3 != 0 {
                assert!(set.erase(&i), "survivor {i} lost from the index");
            }
        }
        assert!(set.is_empty());
    }

    #[test]
    fn sampling_is_uniform_after_churn() {
        let mut set = CategoricalSet::new();
        let mut rng = SimRng::from_seed(42);
        for i in 0..50u32 {
            set.insert(i);
        }
        for i in 10..40 {
            set.erase(&i);
        }
        for i in 30..60 {
            set.insert(i);
        }
        let live: Vec<u32> = set.iter().copied().collect();
        let mut counts = vec![0usize; 60];
        let draws = 200_000;
        for _ in 0..draws {
            counts[set.sample_uniform(&mut rng).unwrap() as usize] += 1;
        }
        let expected = draws as f64 / live.len() as f64;
        // 3-sigma band for a binomial count.
        let sigma = (expected * (1.0 - 1.0 / live.len() as f64)).sqrt();
        for &member in &live {
            let n = counts[member as usize] as f64;
            assert!(
                (n - expected).abs() < 4.0 * sigma,
                "member {member} drawn {n} times, expected {expected:.0} +/- {sigma:.0}"
            );
        }
        for (i, &count) in counts.iter().enumerate() {
            if !live.contains(&(i as u32)) {
                assert_eq!(count, 0, "erased member {i} was sampled");
            }
        }
    }

    #[test]
    fn empty_set_yields_nothing() {
        let set: CategoricalSet<u32> = CategoricalSet::new();
        let mut rng = SimRng::from_seed(1);
        assert_eq!(set.sample_uniform(&mut rng), None);
    }
}
