//! Event-class rates and the top-level partition
//!
//! Each step the aggregator sums the add, follow, tweet, and retweet
//! rates — the per-category sums are already cached in the respective tree
//! roots — and normalizes them into a partition of [0, 1] that one uniform
//! draw selects an event class from.

use crate::core::config::{RateFunctionConfig, RateFunctionKind};
use crate::core::types::{AgentId, SimTime, ZEROTOL};
use crate::network::agent::Agents;
use crate::sampling::tree::Classifier;

/// Time-dependent scalar rate, from `rates.add` in the configuration.
#[derive(Debug, Clone)]
pub struct RateFunction {
    kind: RateFunctionKind,
    value: f64,
    slope: f64,
}

impl RateFunction {
    pub fn from_config(config: &RateFunctionConfig) -> Self {
        Self {
            kind: config.function,
            value: config.value,
            slope: config.slope,
        }
    }

    pub fn eval(&self, time: SimTime) -> f64 {
        match self.kind {
            RateFunctionKind::Constant => self.value,
            RateFunctionKind::Linear => (self.value + self.slope * time).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    AddAgent,
    Follow,
    Tweet,
    Retweet,
}

/// One step's event-class rates and their normalized partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRates {
    pub add: f64,
    pub follow: f64,
    pub tweet: f64,
    pub retweet: f64,
    pub total: f64,
    pub prob_add: f64,
    pub prob_follow: f64,
    pub prob_tweet: f64,
    pub prob_retweet: f64,
}

impl EventRates {
    /// Assemble the partition. The add rate is pinned to zero once the
    /// population has reached its cap; other event classes continue.
    pub fn compute(
        add_fn: &RateFunction,
        time: SimTime,
        n_agents: usize,
        max_agents: usize,
        follow: f64,
        tweet: f64,
        retweet: f64,
    ) -> Self {
        let add = if n_agents >= max_agents { 0.0 } else { add_fn.eval(time) };
        let total = add + follow + tweet + retweet;
        if total <= ZEROTOL {
            return Self {
                add,
                follow,
                tweet,
                retweet,
                ..Self::default()
            };
        }
        Self {
            add,
            follow,
            tweet,
            retweet,
            total,
            prob_add: add / total,
            prob_follow: follow / total,
            prob_tweet: tweet / total,
            prob_retweet: retweet / total,
        }
    }

    /// Map a uniform draw onto the cumulative partition. Floating residue
    /// past the last positive class selects that class; `None` only when
    /// no class carries rate.
    pub fn choose(&self, u: f64) -> Option<EventClass> {
        if self.total <= ZEROTOL {
            return None;
        }
        let classes = [
            (EventClass::AddAgent, self.prob_add),
            (EventClass::Follow, self.prob_follow),
            (EventClass::Tweet, self.prob_tweet),
            (EventClass::Retweet, self.prob_retweet),
        ];
        let mut remaining = u;
        let mut last_positive = None;
        for (class, prob) in classes {
            if prob > 0.0 {
                last_positive = Some(class);
                if remaining - prob <= ZEROTOL {
                    return Some(class);
                }
            }
            remaining -= prob;
        }
        last_positive
    }
}

/// Age bins tracked per agent for event-rate categorization, in months.
/// Agents older than the last bin pool there.
pub const AGENT_AGE_BINS: usize = 48;

/// Classifier for the actor-selection event trees: age-month bin at the
/// top (so a month milestone is one `shift_bins`), agent type below, with
/// the per-member event rate taken from the type's configuration.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    pub rate_per_type: Vec<f64>,
    /// Months elapsed since simulation start; advanced at each milestone
    /// before the tree shifts.
    pub current_month: u32,
}

impl Classifier for EventClassifier {
    type Item = AgentId;
    type Ctx = Agents;

    fn depth(&self) -> usize {
        2
    }

    fn bin_count(&self, level: usize) -> usize {
        if level == 0 {
            AGENT_AGE_BINS
        } else {
            self.rate_per_type.len()
        }
    }

    fn classify(&self, ctx: &Agents, item: AgentId, level: usize) -> usize {
        if level == 0 {
            let birth = crate::core::types::month_of(ctx.creation_times[item.idx()]);
            (self.current_month.saturating_sub(birth) as usize).min(AGENT_AGE_BINS - 1)
        } else {
            ctx.types[item.idx()] as usize
        }
    }

    fn member_rate(&self, path: &[usize]) -> f64 {
        self.rate_per_type[path[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(add: f64, follow: f64, tweet: f64, retweet: f64) -> EventRates {
        let add_fn = RateFunction {
            kind: RateFunctionKind::Constant,
            value: add,
            slope: 0.0,
        };
        EventRates::compute(&add_fn, 0.0, 10, 100, follow, tweet, retweet)
    }

    #[test]
    fn partition_is_normalized() {
        let rates = flat(1.0, 2.0, 3.0, 4.0);
        assert!((rates.total - 10.0).abs() < 1e-12);
        let sum = rates.prob_add + rates.prob_follow + rates.prob_tweet + rates.prob_retweet;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn choose_walks_the_cumulative_partition() {
        let rates = flat(0.1, 0.2, 0.3, 0.4);
        assert_eq!(rates.choose(0.05), Some(EventClass::AddAgent));
        assert_eq!(rates.choose(0.15), Some(EventClass::Follow));
        assert_eq!(rates.choose(0.45), Some(EventClass::Tweet));
        assert_eq!(rates.choose(0.95), Some(EventClass::Retweet));
        // Residue just past 1.0 still lands in the last positive class.
        assert_eq!(rates.choose(1.0 + 1e-12), Some(EventClass::Retweet));
    }

    #[test]
    fn zero_rate_classes_are_skipped() {
        let rates = flat(0.0, 0.0, 1.0, 0.0);
        for u in [0.0, 0.3, 0.999, 1.0] {
            assert_eq!(rates.choose(u), Some(EventClass::Tweet));
        }
    }

    #[test]
    fn exhausted_rates_choose_nothing() {
        let rates = flat(0.0, 0.0, 0.0, 0.0);
        assert_eq!(rates.choose(0.5), None);
        assert_eq!(rates.total, 0.0);
    }

    #[test]
    fn add_rate_pins_to_zero_at_capacity() {
        let add_fn = RateFunction {
            kind: RateFunctionKind::Constant,
            value: 5.0,
            slope: 0.0,
        };
        let rates = EventRates::compute(&add_fn, 0.0, 100, 100, 1.0, 0.0, 0.0);
        assert_eq!(rates.add, 0.0);
        assert_eq!(rates.choose(0.999), Some(EventClass::Follow));
    }

    #[test]
    fn linear_rate_clamps_negative() {
        let f = RateFunction {
            kind: RateFunctionKind::Linear,
            value: 1.0,
            slope: -0.1,
        };
        assert!((f.eval(5.0) - 0.5).abs() < 1e-12);
        assert_eq!(f.eval(20.0), 0.0);
    }
}
