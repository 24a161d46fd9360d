//! Statistical properties of the sampling structures
//!
//! These complement the unit suites with the large-sample fairness checks:
//! weighted draws from a static tree must converge to each leaf's rate
//! share, and uniform draws from a churned set must stay uniform.

use chirpnet::core::rng::SimRng;
use chirpnet::sampling::set::CategoricalSet;
use chirpnet::sampling::tree::{Classifier, RateTree};

/// Two-level classifier over u32 ids with a per-leaf rate table.
struct GridClassifier {
    outer: usize,
    inner: usize,
    rates: Vec<f64>,
}

impl Classifier for GridClassifier {
    type Item = u32;
    type Ctx = ();

    fn depth(&self) -> usize {
        2
    }

    fn bin_count(&self, level: usize) -> usize {
        if level == 0 {
            self.outer
        } else {
            self.inner
        }
    }

    fn classify(&self, _ctx: &(), item: u32, level: usize) -> usize {
        if level == 0 {
            item as usize % self.outer
        } else {
            (item as usize / self.outer) % self.inner
        }
    }

    fn member_rate(&self, path: &[usize]) -> f64 {
        self.rates[path[0] * self.inner + path[1]]
    }
}

#[test]
fn weighted_sampling_fairness_in_a_million_draws() {
    let classifier = GridClassifier {
        outer: 4,
        inner: 3,
        rates: vec![0.1, 1.0, 2.5, 0.0, 3.0, 0.7, 1.2, 0.4, 5.0, 2.0, 0.05, 1.5],
    };
    let mut tree = RateTree::new(classifier);
    // 120 members, ten per leaf.
    for id in 0..120u32 {
        tree.insert(&(), id);
    }

    // Leaf shares from first principles.
    let rates = [0.1, 1.0, 2.5, 0.0, 3.0, 0.7, 1.2, 0.4, 5.0, 2.0, 0.05, 1.5];
    let total: f64 = rates.iter().map(|r| r * 10.0).sum();

    let mut rng = SimRng::from_seed(20_240_601);
    let draws = 1_000_000usize;
    let mut leaf_hits = [0usize; 12];
    for _ in 0..draws {
        let id = tree.sample_weighted(&mut rng).expect("static tree is populated");
        let leaf = (id as usize % 4) * 3 + (id as usize / 4) % 3;
        leaf_hits[leaf] += 1;
    }

    for (leaf, &rate) in rates.iter().enumerate() {
        let share = rate * 10.0 / total;
        let expected = share * draws as f64;
        let sigma = (draws as f64 * share * (1.0 - share)).sqrt().max(1.0);
        let got = leaf_hits[leaf] as f64;
        assert!(
            (got - expected).abs() <= 3.0 * sigma,
            "leaf {leaf}: {got} hits, expected {expected:.0} within 3 sigma ({sigma:.0})"
        );
    }
}

#[test]
fn root_total_matches_leaf_sums_after_heavy_churn() {
    let classifier = GridClassifier {
        outer: 5,
        inner: 4,
        rates: (0..20).map(|i| i as f64 * 0.37).collect(),
    };
    let mut tree = RateTree::new(classifier);
    let mut rng = SimRng::from_seed(99);
    let mut live: Vec<u32> = Vec::new();
    let ops = 100_000u32;
    for step in 0..ops {
        if live.is_empty() || rng.chance(0.55) {
            tree.insert(&(), step);
            live.push(step);
        } else {
            let idx = rng.uniform_index(live.len());
            let id = live.swap_remove(idx);
            assert!(tree.remove(&(), id));
        }
    }
    let cached = tree.total_rate();
    let rebaselined = tree.recalc_rates();
    assert!(
        (cached - rebaselined).abs() <= 1e-9 * ops as f64,
        "cached total {cached} drifted from recomputed {rebaselined} beyond O(eps·ops)"
    );
    assert_eq!(tree.len(), live.len());
}

#[test]
fn uniform_set_draws_stay_uniform_through_history() {
    let mut set = CategoricalSet::new();
    let mut rng = SimRng::from_seed(7);
    // Build an adversarial history: fill, drain most, refill differently.
    for i in 0..1000u32 {
        set.insert(i);
    }
    for i in 0..900 {
        set.erase(&i);
    }
    for i in 2000..2100u32 {
        set.insert(i);
    }
    let live: Vec<u32> = set.iter().copied().collect();
    assert_eq!(live.len(), 200);

    let draws = 1_000_000usize;
    let mut counts = std::collections::HashMap::new();
    for _ in 0..draws {
        *counts.entry(set.sample_uniform(&mut rng).unwrap()).or_insert(0usize) += 1;
    }
    let expected = draws as f64 / live.len() as f64;
    let sigma = (expected * (1.0 - 1.0 / live.len() as f64)).sqrt();
    for &member in &live {
        let got = counts.get(&member).copied().unwrap_or(0) as f64;
        assert!(
            (got - expected).abs() <= 4.0 * sigma,
            "member {member}: {got} draws, expected {expected:.0} +/- {sigma:.1}"
        );
    }
}
