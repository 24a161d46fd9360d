//! Age-binned rate tree with per-member rates
//!
//! Unlike `RateTree`, members here carry individual cached rates: two
//! tweets in the same age bin differ by the reach of their tweeters. The
//! bin layer still gives O(bins) weighted selection and cheap whole-bin
//! accounting; `replace_rate` and `move_bin` service the lazy age
//! migration the tweet bank performs during sampling.

use ahash::AHashMap;

use crate::core::rng::SimRng;
use crate::sampling::set::SetItem;

#[derive(Debug, Clone, Copy)]
struct Slot {
    bin: usize,
    idx: usize,
}

#[derive(Debug, Clone)]
struct WeightedBin<T> {
    items: Vec<T>,
    rates: Vec<f64>,
    total: f64,
}

impl<T> Default for WeightedBin<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            rates: Vec::new(),
            total: 0.0,
        }
    }
}

impl<T: SetItem> WeightedBin<T> {
    fn push(&mut self, item: T, rate: f64) -> usize {
        self.items.push(item);
        self.rates.push(rate);
        self.total += rate;
        self.items.len() - 1
    }

    /// Swap-removes the slot; returns the member moved into it, if any.
    fn take(&mut self, idx: usize) -> (f64, Option<T>) {
        let rate = self.rates.swap_remove(idx);
        self.items.swap_remove(idx);
        self.total -= rate;
        if self.items.is_empty() {
            self.total = 0.0;
        }
        let moved = self.items.get(idx).copied();
        (rate, moved)
    }

    fn sample(&self, rng: &mut SimRng) -> Option<T> {
        if self.total <= 0.0 {
            return None;
        }
        let mut u = rng.unit() * self.total;
        let mut fallback = None;
        for (i, &rate) in self.rates.iter().enumerate() {
            if rate > 0.0 {
                fallback = Some(i);
                if u < rate {
                    break;
                }
            }
            u -= rate;
        }
        fallback.map(|i| self.items[i])
    }
}

/// Collection of members distributed over age bins, sampled proportionally
/// to individual rates.
#[derive(Debug, Clone)]
pub struct TimeDepRateTree<T: SetItem> {
    bins: Vec<WeightedBin<T>>,
    locs: AHashMap<T, Slot>,
    total: f64,
}

impl<T: SetItem> TimeDepRateTree<T> {
    pub fn new(n_bins: usize) -> Self {
        assert!(n_bins >= 1);
        Self {
            bins: (0..n_bins).map(|_| WeightedBin::default()).collect(),
            locs: AHashMap::new(),
            total: 0.0,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn len(&self) -> usize {
        self.locs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    pub fn total_rate(&self) -> f64 {
        self.total
    }

    pub fn bin_total(&self, bin: usize) -> f64 {
        self.bins[bin].total
    }

    pub fn bin_len(&self, bin: usize) -> usize {
        self.bins[bin].items.len()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.locs.contains_key(item)
    }

    /// Returns false when the member is already present.
    pub fn insert(&mut self, item: T, bin: usize, rate: f64) -> bool {
        debug_assert!(rate >= 0.0, "negative member rate");
        if self.locs.contains_key(&item) {
            return false;
        }
        let idx = self.bins[bin].push(item, rate);
        self.locs.insert(item, Slot { bin, idx });
        self.total += rate;
        true
    }

    /// Removes a member, returning its cached rate.
    pub fn remove(&mut self, item: &T) -> Option<f64> {
        let slot = self.locs.remove(item)?;
        let (rate, moved) = self.bins[slot.bin].take(slot.idx);
        if let Some(moved) = moved {
            self.locs.insert(moved, slot);
        }
        self.total -= rate;
        if self.locs.is_empty() {
            self.total = 0.0;
        }
        Some(rate)
    }

    /// Updates a member's rate in place, adjusting bin and root totals by
    /// the delta.
    pub fn replace_rate(&mut self, item: &T, new_rate: f64) -> bool {
        debug_assert!(new_rate >= 0.0, "negative member rate");
        let Some(&slot) = self.locs.get(item) else {
            return false;
        };
        let bin = &mut self.bins[slot.bin];
        let delta = new_rate - bin.rates[slot.idx];
        bin.rates[slot.idx] = new_rate;
        bin.total += delta;
        self.total += delta;
        true
    }

    /// Moves a member to another bin with a fresh rate.
    pub fn move_bin(&mut self, item: T, new_bin: usize, new_rate: f64) -> bool {
        if self.remove(&item).is_none() {
            return false;
        }
        self.insert(item, new_bin, new_rate)
    }

    /// Draw one member with probability proportional to its rate: a bin is
    /// chosen by its total, then a member within it by individual rate.
    pub fn sample_weighted(&self, rng: &mut SimRng) -> Option<T> {
        if self.total <= 0.0 {
            return None;
        }
        let mut u = rng.unit() * self.total;
        let mut fallback = None;
        for bin in &self.bins {
            if bin.total > 0.0 {
                fallback = Some(bin);
                if u < bin.total {
                    break;
                }
            }
            u -= bin.total;
        }
        fallback?.sample(rng)
    }

    /// Members of one bin, for expiry sweeps.
    pub fn bin_members(&self, bin: usize) -> &[T] {
        &self.bins[bin].items
    }

    /// Recompute bin and root totals from the per-member rates,
    /// rebaselining floating drift.
    pub fn recalc_totals(&mut self) -> f64 {
        let mut total = 0.0;
        for bin in &mut self.bins {
            bin.total = bin.rates.iter().sum();
            total += bin.total;
        }
        self.total = total;
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_and_totals() {
        let mut tree: TimeDepRateTree<u64> = TimeDepRateTree::new(4);
        assert!(tree.insert(1, 0, 2.0));
        assert!(tree.insert(2, 0, 3.0));
        assert!(tree.insert(3, 2, 5.0));
        assert!(!tree.insert(1, 1, 1.0), "duplicate id must be rejected");
        assert_eq!(tree.len(), 3);
        assert!((tree.total_rate() - 10.0).abs() < 1e-12);
        assert!((tree.bin_total(0) - 5.0).abs() < 1e-12);

        assert_eq!(tree.remove(&1), Some(2.0));
        assert_eq!(tree.remove(&1), None);
        assert!((tree.total_rate() - 8.0).abs() < 1e-12);
        // The swap-remove relocated id 2; it must still be reachable.
        assert!(tree.contains(&2));
        assert_eq!(tree.remove(&2), Some(3.0));
        assert_eq!(tree.remove(&3), Some(5.0));
        assert!(tree.is_empty());
        assert_eq!(tree.total_rate(), 0.0);
    }

    #[test]
    fn replace_rate_shifts_mass() {
        let mut tree: TimeDepRateTree<u64> = TimeDepRateTree::new(2);
        tree.insert(1, 0, 1.0);
        tree.insert(2, 1, 1.0);
        assert!(tree.replace_rate(&2, 9.0));
        assert!((tree.total_rate() - 10.0).abs() < 1e-12);

        let mut rng = SimRng::from_seed(13);
        let draws = 100_000;
        let mut hits = 0;
        for _ in 0..draws {
            if tree.sample_weighted(&mut rng) == Some(2) {
                hits += 1;
            }
        }
        let share = hits as f64 / draws as f64;
        assert!(
            (share - 0.9).abs() < 0.01,
            "member with 90% of the rate drawn {share} of the time"
        );
    }

    #[test]
    fn move_bin_relocates() {
        let mut tree: TimeDepRateTree<u64> = TimeDepRateTree::new(3);
        tree.insert(7, 0, 4.0);
        assert!(tree.move_bin(7, 2, 1.5));
        assert_eq!(tree.bin_len(0), 0);
        assert_eq!(tree.bin_len(2), 1);
        assert!((tree.total_rate() - 1.5).abs() < 1e-12);
        assert!(!tree.move_bin(99, 1, 1.0), "unknown member cannot move");
    }

    #[test]
    fn zero_rate_members_are_not_drawn() {
        let mut tree: TimeDepRateTree<u64> = TimeDepRateTree::new(2);
        tree.insert(1, 0, 0.0);
        let mut rng = SimRng::from_seed(3);
        assert_eq!(tree.sample_weighted(&mut rng), None);
        tree.insert(2, 1, 1.0);
        for _ in 0..1000 {
            assert_eq!(tree.sample_weighted(&mut rng), Some(2));
        }
    }
}
