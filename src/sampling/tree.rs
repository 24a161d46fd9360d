//! Nested categorical rate tree
//!
//! A `RateTree` stores every member in the leaf its classifier selects and
//! caches, at every internal node, the summed rate of the subtree below.
//! One weighted draw descends from the root in O(depth), subtracting child
//! totals from a scaled uniform draw; at the leaf every member shares the
//! leaf's per-member rate, so a uniform draw finishes the selection.
//!
//! Mutations propagate their rate delta along exactly one root-to-leaf
//! path, which keeps the cached totals equal to the leaf sums up to
//! accumulated rounding; `recalc_rates` rebaselines that drift from the
//! leaves up.

use crate::core::rng::SimRng;
use crate::sampling::set::{CategoricalSet, SetItem};

/// Supplies the tree's shape, the bin a member belongs to at every level,
/// and the per-member rate of each leaf.
///
/// `Ctx` is whatever external state classification needs (attribute
/// columns, degree counts); it is passed by reference into every mutating
/// call so the tree itself never aliases that state.
pub trait Classifier {
    type Item: SetItem;
    type Ctx: ?Sized;

    fn depth(&self) -> usize;
    fn bin_count(&self, level: usize) -> usize;
    fn classify(&self, ctx: &Self::Ctx, item: Self::Item, level: usize) -> usize;
    fn member_rate(&self, path: &[usize]) -> f64;
}

#[derive(Debug, Clone)]
struct Leaf<T: SetItem> {
    members: CategoricalSet<T>,
    /// Leaf coordinate, one bin index per level.
    path: Vec<usize>,
    member_rate: f64,
    total: f64,
}

impl<T: SetItem> Leaf<T> {
    fn new(path: Vec<usize>, member_rate: f64) -> Self {
        Self {
            members: CategoricalSet::new(),
            path,
            member_rate,
            total: 0.0,
        }
    }
}

/// Fixed-depth tree of nested bins with cached subtree rates.
///
/// Nodes are laid out as a flat grid: the node for path prefix
/// `(b_0 .. b_{l-1})` lives at mixed-radix index `b_0·∏bins + …` in the
/// level-`l` arrays, and leaves occupy the full-depth coordinates.
#[derive(Debug, Clone)]
pub struct RateTree<C: Classifier> {
    classifier: C,
    level_bins: Vec<usize>,
    /// `node_totals[l]` covers the internal nodes at level `l` (level 0 is
    /// the root); leaf totals live in the leaves themselves.
    node_totals: Vec<Vec<f64>>,
    node_counts: Vec<Vec<usize>>,
    leaves: Vec<Leaf<C::Item>>,
}

impl<C: Classifier> RateTree<C> {
    pub fn new(classifier: C) -> Self {
        let depth = classifier.depth();
        assert!(depth >= 1, "a rate tree needs at least one level of bins");
        let level_bins: Vec<usize> = (0..depth).map(|l| classifier.bin_count(l)).collect();
        assert!(level_bins.iter().all(|&b| b >= 1));

        let mut node_totals = Vec::with_capacity(depth);
        let mut node_counts = Vec::with_capacity(depth);
        let mut width = 1;
        for &bins in &level_bins {
            node_totals.push(vec![0.0; width]);
            node_counts.push(vec![0; width]);
            width *= bins;
        }

        let leaves = (0..width)
            .map(|i| {
                let path = Self::decode_path(&level_bins, i);
                let rate = classifier.member_rate(&path);
                Leaf::new(path, rate)
            })
            .collect();

        Self {
            classifier,
            level_bins,
            node_totals,
            node_counts,
            leaves,
        }
    }

    fn decode_path(level_bins: &[usize], mut leaf_idx: usize) -> Vec<usize> {
        let mut path = vec![0; level_bins.len()];
        for (l, &bins) in level_bins.iter().enumerate().rev() {
            path[l] = leaf_idx % bins;
            leaf_idx /= bins;
        }
        path
    }

    fn leaf_index(&self, path: &[usize]) -> usize {
        let mut idx = 0;
        for (l, &bin) in path.iter().enumerate() {
            debug_assert!(bin < self.level_bins[l]);
            idx = idx * self.level_bins[l] + bin;
        }
        idx
    }

    fn classify_path(&self, ctx: &C::Ctx, item: C::Item) -> Vec<usize> {
        (0..self.level_bins.len())
            .map(|l| self.classifier.classify(ctx, item, l))
            .collect()
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    pub fn len(&self) -> usize {
        self.node_counts[0][0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_rate(&self) -> f64 {
        self.node_totals[0][0]
    }

    pub fn contains(&self, ctx: &C::Ctx, item: C::Item) -> bool {
        let path = self.classify_path(ctx, item);
        self.leaves[self.leaf_index(&path)].members.contains(&item)
    }

    /// Classify and insert. Returns false (and changes nothing) when the
    /// member is already present.
    pub fn insert(&mut self, ctx: &C::Ctx, item: C::Item) -> bool {
        let path = self.classify_path(ctx, item);
        let li = self.leaf_index(&path);
        let leaf = &mut self.leaves[li];
        if !leaf.members.insert(item) {
            return false;
        }
        let delta = leaf.member_rate;
        debug_assert!(delta >= 0.0, "negative rate delta on insert");
        leaf.total += delta;
        self.propagate(&path, delta, 1);
        true
    }

    /// Classify and remove. Returns false when the member was absent from
    /// the leaf its classification selects.
    pub fn remove(&mut self, ctx: &C::Ctx, item: C::Item) -> bool {
        let path = self.classify_path(ctx, item);
        let li = self.leaf_index(&path);
        let leaf = &mut self.leaves[li];
        if !leaf.members.erase(&item) {
            return false;
        }
        let delta = -leaf.member_rate;
        leaf.total += delta;
        debug_assert!(leaf.total > -1e-9, "negative leaf total after remove");
        if leaf.members.is_empty() {
            // Pin an emptied leaf to exactly zero so rounding residue
            // cannot accumulate into phantom rate.
            leaf.total = 0.0;
        }
        self.propagate(&path, delta, -1);
        true
    }

    fn propagate(&mut self, path: &[usize], rate_delta: f64, count_delta: isize) {
        let mut idx = 0;
        for (l, &bin) in path.iter().enumerate() {
            self.node_totals[l][idx] += rate_delta;
            let count = &mut self.node_counts[l][idx];
            *count = count.checked_add_signed(count_delta).expect("member count underflow");
            idx = idx * self.level_bins[l] + bin;
        }
    }

    fn child_total(&self, level: usize, child_idx: usize) -> f64 {
        if level + 1 == self.level_bins.len() {
            self.leaves[child_idx].total
        } else {
            self.node_totals[level + 1][child_idx]
        }
    }

    fn child_count(&self, level: usize, child_idx: usize) -> usize {
        if level + 1 == self.level_bins.len() {
            self.leaves[child_idx].members.len()
        } else {
            self.node_counts[level + 1][child_idx]
        }
    }

    /// Draw one member with probability proportional to its rate.
    /// O(depth · max-bin-count). Returns `None` when the tree is empty or
    /// carries no rate.
    pub fn sample_weighted(&self, rng: &mut SimRng) -> Option<C::Item> {
        if self.is_empty() || self.total_rate() <= 0.0 {
            return None;
        }
        let mut idx = 0;
        let mut node_total = self.total_rate();
        for (l, &bins) in self.level_bins.iter().enumerate() {
            let mut u = rng.unit() * node_total;
            let mut chosen = None;
            let mut last_positive = None;
            for c in 0..bins {
                let child = idx * bins + c;
                let t = self.child_total(l, child);
                if t > 0.0 {
                    last_positive = Some((child, t));
                    if u < t {
                        chosen = Some((child, t));
                        break;
                    }
                }
                u -= t;
            }
            // Rounding can leave the draw fractionally past the summed
            // children; fall to the last child carrying rate.
            let (child, t) = chosen.or(last_positive)?;
            idx = child;
            node_total = t;
        }
        self.leaves[idx].members.sample_uniform(rng)
    }

    /// Draw one member uniformly, descending by member count instead of
    /// rate.
    pub fn sample_uniform(&self, rng: &mut SimRng) -> Option<C::Item> {
        if self.is_empty() {
            return None;
        }
        let mut idx = 0;
        let mut node_count = self.len();
        for (l, &bins) in self.level_bins.iter().enumerate() {
            let mut u = rng.uniform_index(node_count);
            let mut chosen = None;
            for c in 0..bins {
                let child = idx * bins + c;
                let n = self.child_count(l, child);
                if u < n {
                    chosen = Some((child, n));
                    break;
                }
                u -= n;
            }
            let (child, n) = chosen?;
            idx = child;
            node_count = n;
        }
        self.leaves[idx].members.sample_uniform(rng)
    }

    /// Weighted draw with per-call leaf weights instead of the maintained
    /// rates: a leaf's mass is `weight(path) × member count`, and members
    /// within a leaf stay equally likely. Used where the weighting depends
    /// on the event being processed rather than on the tree.
    pub fn sample_weighted_with(
        &self,
        rng: &mut SimRng,
        weight: impl Fn(&[usize]) -> f64,
    ) -> Option<C::Item> {
        let total = self.weighted_total_with(&weight);
        if total <= 0.0 {
            return None;
        }
        let mut u = rng.unit() * total;
        let mut fallback = None;
        for leaf in &self.leaves {
            if leaf.members.is_empty() {
                continue;
            }
            let mass = weight(&leaf.path) * leaf.members.len() as f64;
            if mass > 0.0 {
                fallback = Some(leaf);
                if u < mass {
                    break;
                }
            }
            u -= mass;
        }
        fallback?.members.sample_uniform(rng)
    }

    /// Total mass under per-call leaf weights: `Σ weight(path) × |leaf|`.
    pub fn weighted_total_with(&self, weight: impl Fn(&[usize]) -> f64) -> f64 {
        self.leaves
            .iter()
            .filter(|leaf| !leaf.members.is_empty())
            .map(|leaf| weight(&leaf.path) * leaf.members.len() as f64)
            .sum()
    }

    /// Iterate every member, leaf by leaf.
    pub fn iter_members(&self) -> impl Iterator<Item = &C::Item> {
        self.leaves.iter().flat_map(|leaf| leaf.members.iter())
    }

    /// Recompute every cached total from the leaves up, refreshing leaf
    /// per-member rates from the classifier. Rebaselines floating drift.
    pub fn recalc_rates(&mut self) -> f64 {
        for leaf in &mut self.leaves {
            leaf.member_rate = self.classifier.member_rate(&leaf.path);
            leaf.total = leaf.member_rate * leaf.members.len() as f64;
        }
        let depth = self.level_bins.len();
        for l in (0..depth).rev() {
            let bins = self.level_bins[l];
            for idx in 0..self.node_totals[l].len() {
                let mut total = 0.0;
                let mut count = 0;
                for c in 0..bins {
                    let child = idx * bins + c;
                    total += self.child_total(l, child);
                    count += self.child_count(l, child);
                }
                self.node_totals[l][idx] = total;
                self.node_counts[l][idx] = count;
            }
        }
        self.total_rate()
    }

    /// Advance an age-like top level by one bin: bin k's subtree becomes
    /// bin k+1's, bin 0 empties, and the subtree pushed past the end is
    /// merged into the (new) last bin. Callers update the classifier's
    /// reference point first so classification agrees with the new layout.
    pub fn shift_bins(&mut self) {
        let top_bins = self.level_bins[0];
        let chunk = self.leaves.len() / top_bins;
        if top_bins >= 2 {
            // Merge the overflowing top bin into its predecessor, leaf by
            // leaf; sub-level coordinates are unchanged by the shift.
            for off in 0..chunk {
                let src = (top_bins - 1) * chunk + off;
                let dst = (top_bins - 2) * chunk + off;
                let moved = std::mem::take(&mut self.leaves[src].members);
                for item in moved.iter() {
                    self.leaves[dst].members.insert(*item);
                }
                self.leaves[src].total = 0.0;
            }
            // The emptied overflow chunk rotates around to become bin 0.
            self.leaves.rotate_right(chunk);
            for (i, leaf) in self.leaves.iter_mut().enumerate() {
                leaf.path = Self::decode_path(&self.level_bins, i);
            }
        }
        self.recalc_rates();
    }
}
