//! Agent records: attribute columns and the recent-retweet ring buffer
//!
//! Agents are stored struct-of-arrays and preallocated to the configured
//! population bound; everything else in the simulator refers to them by
//! dense `AgentId` only.

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, SimTime, RETWEET_BUFFER_CAPACITY};

pub type AgentTypeId = u16;
pub type RegionId = u16;
pub type LanguageId = u16;
pub type IdeologyId = u16;
pub type PreferenceClassId = u16;

/// One witnessed retweet: who originally tweeted, and when the propagation
/// reached this agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetweetRecord {
    pub original_tweeter: AgentId,
    pub time: SimTime,
}

/// Fixed-capacity ring of the most recent retweets an agent has seen.
/// Oldest entries are overwritten once the ring is full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetweetBuffer {
    ring: Vec<RetweetRecord>,
    /// Slot the next push writes to once the ring is at capacity.
    head: usize,
}

impl RetweetBuffer {
    pub fn push(&mut self, record: RetweetRecord) {
        if self.ring.len() < RETWEET_BUFFER_CAPACITY {
            self.ring.push(record);
        } else {
            self.ring[self.head] = record;
            self.head = (self.head + 1) % RETWEET_BUFFER_CAPACITY;
        }
    }

    pub fn most_recent(&self) -> Option<&RetweetRecord> {
        if self.ring.is_empty() {
            return None;
        }
        let last = if self.ring.len() < RETWEET_BUFFER_CAPACITY {
            self.ring.len() - 1
        } else {
            (self.head + RETWEET_BUFFER_CAPACITY - 1) % RETWEET_BUFFER_CAPACITY
        };
        Some(&self.ring[last])
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Attribute columns for every agent, indexed by `AgentId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agents {
    pub types: Vec<AgentTypeId>,
    pub regions: Vec<RegionId>,
    pub languages: Vec<LanguageId>,
    pub ideologies: Vec<IdeologyId>,
    pub preference_classes: Vec<PreferenceClassId>,
    pub creation_times: Vec<SimTime>,
    pub tweet_counts: Vec<u32>,
    pub retweet_counts: Vec<u32>,
    /// Ordered sequence of followed agents, per agent.
    pub follow_sets: Vec<Vec<AgentId>>,
    pub retweet_buffers: Vec<RetweetBuffer>,
}

impl Agents {
    pub fn with_capacity(max_agents: usize) -> Self {
        Self {
            types: Vec::with_capacity(max_agents),
            regions: Vec::with_capacity(max_agents),
            languages: Vec::with_capacity(max_agents),
            ideologies: Vec::with_capacity(max_agents),
            preference_classes: Vec::with_capacity(max_agents),
            creation_times: Vec::with_capacity(max_agents),
            tweet_counts: Vec::with_capacity(max_agents),
            retweet_counts: Vec::with_capacity(max_agents),
            follow_sets: Vec::with_capacity(max_agents),
            retweet_buffers: Vec::with_capacity(max_agents),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        ty: AgentTypeId,
        region: RegionId,
        language: LanguageId,
        ideology: IdeologyId,
        preference_class: PreferenceClassId,
        creation_time: SimTime,
    ) -> AgentId {
        let id = AgentId::from_index(self.len());
        self.types.push(ty);
        self.regions.push(region);
        self.languages.push(language);
        self.ideologies.push(ideology);
        self.preference_classes.push(preference_class);
        self.creation_times.push(creation_time);
        self.tweet_counts.push(0);
        self.retweet_counts.push(0);
        self.follow_sets.push(Vec::new());
        self.retweet_buffers.push(RetweetBuffer::default());
        id
    }

    /// Lifetime-average tweets per simulated minute. The +1 keeps a
    /// newborn agent's rate finite.
    pub fn tweet_rate(&self, id: AgentId, now: SimTime) -> f64 {
        let age = now - self.creation_times[id.idx()] + 1.0;
        self.tweet_counts[id.idx()] as f64 / age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_overwrites_oldest() {
        let mut buf = RetweetBuffer::default();
        assert!(buf.most_recent().is_none());
        for i in 0..(RETWEET_BUFFER_CAPACITY + 5) {
            buf.push(RetweetRecord {
                original_tweeter: AgentId(i as u32),
                time: i as f64,
            });
            assert_eq!(buf.most_recent().unwrap().time, i as f64);
        }
        assert_eq!(buf.len(), RETWEET_BUFFER_CAPACITY);
    }

    #[test]
    fn tweet_rate_is_finite_for_newborns() {
        let mut agents = Agents::with_capacity(4);
        let id = agents.push(0, 0, 0, 0, 0, 100.0);
        agents.tweet_counts[id.idx()] = 10;
        assert!((agents.tweet_rate(id, 100.0) - 10.0).abs() < 1e-12);
        assert!((agents.tweet_rate(id, 109.0) - 1.0).abs() < 1e-12);
    }
}
