//! Core identifiers and simulation-wide constants

use serde::{Deserialize, Serialize};

/// Stable identifier of an agent; indexes directly into the agent arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn from_index(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Monotonically increasing tweet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TweetId(pub u64);

/// Simulated time, in minutes.
pub type SimTime = f64;

/// Tolerance for comparing a uniform draw against the cumulative event partition.
/// Small enough to keep precision for very low add rates.
pub const ZEROTOL: f64 = 1e-16;

/// Thirty 24-hour days, in simulated minutes.
pub const APPROX_MONTH: SimTime = (24 * 60 * 30) as f64;

/// Granularity at which age-like categorizations are advanced and
/// population milestones recorded.
pub const TIME_CAT_FREQ: SimTime = APPROX_MONTH;

/// A retweet in an agent's ring buffer is only re-propagated or followed
/// through if it happened within this window (48 hours).
pub const RETWEET_FRESHNESS_WINDOW: SimTime = (48 * 60) as f64;

/// Capacity of the per-agent recent-retweet ring buffer.
pub const RETWEET_BUFFER_CAPACITY: usize = 16;

/// Interrupt attempts beyond this count demand an immediate abort rather
/// than a graceful end-of-step halt.
pub const CTRL_C_ATTEMPTS_TO_ABORT: u32 = 4;

/// One console echo per this many summary rows.
pub const STDOUT_OUTPUT_RATE: usize = 100;

/// Number of whole months elapsed at `time`.
pub fn month_of(time: SimTime) -> u32 {
    (time / APPROX_MONTH) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_counting() {
        assert_eq!(month_of(0.0), 0);
        assert_eq!(month_of(APPROX_MONTH - 1.0), 0);
        assert_eq!(month_of(APPROX_MONTH), 1);
        assert_eq!(month_of(APPROX_MONTH * 3.5), 3);
    }
}
