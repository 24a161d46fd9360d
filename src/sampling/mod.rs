//! Sampling data structures for the kinetic Monte Carlo core
//!
//! `CategoricalSet` gives O(1) membership and uniform draws; `RateTree`
//! nests categorical sets under cached rate totals for O(depth) weighted
//! draws; `TimeDepRateTree` adds per-member rates for populations whose
//! weights decay over simulated time.

pub mod set;
pub mod time_dep;
pub mod tree;

pub use set::{CategoricalSet, SetItem};
pub use time_dep::TimeDepRateTree;
pub use tree::{Classifier, RateTree};
