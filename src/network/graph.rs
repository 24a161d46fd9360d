//! The directed follow graph and its categorizations
//!
//! `Network` owns every agent record plus the derived structures the
//! selection engines sample from: per-agent follower trees (nested
//! language × ideology-distance × preference class), global and per-type
//! follow-degree rank trees, per-type member sets, and the hashtag pool.
//! Everything holds ids only; the attribute columns in `Agents` are the
//! single source of truth for classification.

use crate::core::config::SimConfig;
use crate::core::error::{Result, SimError};
use crate::core::rng::SimRng;
use crate::core::types::{AgentId, SimTime};
use crate::network::agent::{
    AgentTypeId, Agents, IdeologyId, LanguageId, PreferenceClassId, RegionId, RetweetRecord,
};
use crate::sampling::set::CategoricalSet;
use crate::sampling::tree::{Classifier, RateTree};

/// Result of a follow attempt. Rejections are normal outcomes, counted by
/// the caller, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    SelfFollow,
    Duplicate,
}

/// Ideology-distance bins inside a follower tree.
pub const IDEOLOGY_SAME: usize = 0;
pub const IDEOLOGY_DIFFERENT: usize = 1;

/// Classifier for one agent's follower set: language, then ideology
/// distance to the set's owner, then preference class. All three follower
/// attributes are fixed at creation, so a member never migrates.
#[derive(Debug, Clone)]
pub struct FollowerSetClassifier {
    owner_ideology: IdeologyId,
    n_languages: usize,
    n_preference_classes: usize,
}

impl Classifier for FollowerSetClassifier {
    type Item = AgentId;
    type Ctx = Agents;

    fn depth(&self) -> usize {
        3
    }

    fn bin_count(&self, level: usize) -> usize {
        match level {
            0 => self.n_languages,
            1 => 2,
            _ => self.n_preference_classes,
        }
    }

    fn classify(&self, ctx: &Agents, item: AgentId, level: usize) -> usize {
        match level {
            0 => ctx.languages[item.idx()] as usize,
            1 => {
                if ctx.ideologies[item.idx()] == self.owner_ideology {
                    IDEOLOGY_SAME
                } else {
                    IDEOLOGY_DIFFERENT
                }
            }
            _ => ctx.preference_classes[item.idx()] as usize,
        }
    }

    fn member_rate(&self, _path: &[usize]) -> f64 {
        // Transmission weights depend on the tweet being reacted to, so
        // they are supplied per call; the maintained totals just count.
        1.0
    }
}

pub type FollowerSet = RateTree<FollowerSetClassifier>;

/// Classifier over follower-degree bins with geometric thresholds.
/// Weighted sampling from a tree under this classifier draws a bin
/// proportionally to `bin_weight × population` — preferential attachment.
#[derive(Debug, Clone)]
pub struct DegreeClassifier {
    thresholds: Vec<u32>,
    weights: Vec<f64>,
}

impl DegreeClassifier {
    /// Bins `[0], [1], [2,3], [4,7], …` doubling up to `max_degree`, each
    /// weighted `(lowest_degree + 1)^exponent`.
    pub fn geometric(max_degree: usize, exponent: f64) -> Self {
        let mut thresholds = vec![0u32, 1];
        let mut edge = 2u32;
        while (edge as usize) < max_degree {
            thresholds.push(edge);
            edge = edge.saturating_mul(2);
        }
        let weights = thresholds
            .iter()
            .map(|&t| ((t + 1) as f64).powf(exponent))
            .collect();
        Self { thresholds, weights }
    }

    fn bin_of(&self, degree: u32) -> usize {
        self.thresholds.partition_point(|&t| t <= degree) - 1
    }
}

impl Classifier for DegreeClassifier {
    type Item = AgentId;
    type Ctx = [u32];

    fn depth(&self) -> usize {
        1
    }

    fn bin_count(&self, _level: usize) -> usize {
        self.thresholds.len()
    }

    fn classify(&self, ctx: &[u32], item: AgentId, _level: usize) -> usize {
        self.bin_of(ctx[item.idx()])
    }

    fn member_rate(&self, path: &[usize]) -> f64 {
        self.weights[path[0]]
    }
}

/// Agents that recently tweeted a hashtag, binned region × ideology so
/// hashtag-based follow can filter on either.
#[derive(Debug, Clone)]
pub struct HashtagPool {
    n_ideologies: usize,
    sets: Vec<CategoricalSet<AgentId>>,
}

impl HashtagPool {
    fn new(n_regions: usize, n_ideologies: usize) -> Self {
        Self {
            n_ideologies,
            sets: (0..n_regions * n_ideologies)
                .map(|_| CategoricalSet::new())
                .collect(),
        }
    }

    fn grid(&self, region: RegionId, ideology: IdeologyId) -> usize {
        region as usize * self.n_ideologies + ideology as usize
    }

    pub fn insert(&mut self, region: RegionId, ideology: IdeologyId, id: AgentId) {
        let cell = self.grid(region, ideology);
        self.sets[cell].insert(id);
    }

    /// Uniform member of the pool restricted by the optional filters; cells
    /// are weighted by population so the draw is uniform over candidates.
    pub fn sample(
        &self,
        rng: &mut SimRng,
        region: Option<RegionId>,
        ideology: Option<IdeologyId>,
    ) -> Option<AgentId> {
        let n_regions = self.sets.len() / self.n_ideologies;
        let cells: Vec<usize> = (0..n_regions)
            .filter(|&r| region.map_or(true, |want| want as usize == r))
            .flat_map(|r| {
                (0..self.n_ideologies)
                    .filter(|&i| ideology.map_or(true, |want| want as usize == i))
                    .map(move |i| r * self.n_ideologies + i)
            })
            .collect();
        let weights: Vec<f64> = cells.iter().map(|&c| self.sets[c].len() as f64).collect();
        let picked = rng.pick_weighted(&weights)?;
        self.sets[cells[picked]].sample_uniform(rng)
    }
}

/// Derived per-type and per-region tables, flattened out of the config so
/// the hot path never walks the config tree.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub max_agents: usize,
    pub n_types: usize,
    pub n_regions: usize,
    pub n_languages: usize,
    pub n_ideologies: usize,
    pub n_preference_classes: usize,
    pub region_add_weights: Vec<f64>,
    pub type_add_weights: Vec<f64>,
    pub type_follow_weights: Vec<f64>,
    pub region_language_weights: Vec<Vec<f64>>,
    pub region_ideology_weights: Vec<Vec<f64>>,
    pub region_preference_weights: Vec<Vec<f64>>,
    pub followback_probability: Vec<f64>,
    /// (care_about_region, care_about_ideology) per agent type.
    pub hashtag_options: Vec<(bool, bool)>,
    pub barabasi_exponent: f64,
}

impl NetworkParams {
    fn from_config(config: &SimConfig) -> Self {
        Self {
            max_agents: config.analysis.max_agents,
            n_types: config.agent_types.len(),
            n_regions: config.regions.len(),
            n_languages: config.languages.len(),
            n_ideologies: config.ideologies.len(),
            n_preference_classes: config.preference_classes.len(),
            region_add_weights: config.regions.iter().map(|r| r.add_weight).collect(),
            type_add_weights: config.agent_types.iter().map(|t| t.weights.add).collect(),
            type_follow_weights: config.agent_types.iter().map(|t| t.weights.follow).collect(),
            region_language_weights: config
                .regions
                .iter()
                .map(|r| r.language_weights.clone())
                .collect(),
            region_ideology_weights: config
                .regions
                .iter()
                .map(|r| r.ideology_weights.clone())
                .collect(),
            region_preference_weights: config
                .regions
                .iter()
                .map(|r| r.preference_class_weights.clone())
                .collect(),
            followback_probability: config
                .agent_types
                .iter()
                .map(|t| t.followback_probability)
                .collect(),
            hashtag_options: config
                .agent_types
                .iter()
                .map(|t| {
                    (
                        t.hashtag_follow_options.care_about_region,
                        t.hashtag_follow_options.care_about_ideology,
                    )
                })
                .collect(),
            barabasi_exponent: config.analysis.barabasi_exponent,
        }
    }
}

/// The simulated network: agent arena plus every derived categorization.
#[derive(Debug)]
pub struct Network {
    params: NetworkParams,
    pub agents: Agents,
    follower_counts: Vec<u32>,
    follower_sets: Vec<FollowerSet>,
    follow_rank: RateTree<DegreeClassifier>,
    type_rank: Vec<RateTree<DegreeClassifier>>,
    type_members: Vec<CategoricalSet<AgentId>>,
    pub hashtag_pool: HashtagPool,
}

impl Network {
    pub fn new(config: &SimConfig) -> Self {
        let params = NetworkParams::from_config(config);
        let degree = || DegreeClassifier::geometric(params.max_agents, params.barabasi_exponent);
        Self {
            agents: Agents::with_capacity(params.max_agents),
            follower_counts: Vec::with_capacity(params.max_agents),
            follower_sets: Vec::with_capacity(params.max_agents),
            follow_rank: RateTree::new(degree()),
            type_rank: (0..params.n_types).map(|_| RateTree::new(degree())).collect(),
            type_members: (0..params.n_types).map(|_| CategoricalSet::new()).collect(),
            hashtag_pool: HashtagPool::new(params.n_regions, params.n_ideologies),
            params,
        }
    }

    /// Rebuild a network from restored agent columns: follower counts,
    /// rank trees, follower trees, and type sets are all derived from the
    /// follow sets. The hashtag pool starts empty and repopulates as new
    /// hashtag tweets occur.
    pub fn from_agents(config: &SimConfig, agents: Agents) -> Result<Self> {
        if agents.len() > config.analysis.max_agents {
            return Err(SimError::Capacity(format!(
                "snapshot holds {} agents, max_agents is {}",
                agents.len(),
                config.analysis.max_agents
            )));
        }
        let mut net = Self::new(config);
        net.agents = agents;
        for idx in 0..net.agents.len() {
            net.follower_counts.push(0);
            net.follower_sets
                .push(RateTree::new(net.follower_classifier(AgentId::from_index(idx))));
        }
        for idx in 0..net.agents.len() {
            for f in 0..net.agents.follow_sets[idx].len() {
                let target = net.agents.follow_sets[idx][f];
                net.follower_counts[target.idx()] += 1;
            }
        }
        for idx in 0..net.agents.len() {
            let id = AgentId::from_index(idx);
            let ty = net.agents.types[idx] as usize;
            net.follow_rank.insert(&net.follower_counts, id);
            net.type_rank[ty].insert(&net.follower_counts, id);
            net.type_members[ty].insert(id);
        }
        for idx in 0..net.agents.len() {
            let follower = AgentId::from_index(idx);
            for f in 0..net.agents.follow_sets[idx].len() {
                let target = net.agents.follow_sets[idx][f];
                net.follower_sets[target.idx()].insert(&net.agents, follower);
            }
        }
        Ok(net)
    }

    fn follower_classifier(&self, owner: AgentId) -> FollowerSetClassifier {
        FollowerSetClassifier {
            owner_ideology: self.agents.ideologies[owner.idx()],
            n_languages: self.params.n_languages,
            n_preference_classes: self.params.n_preference_classes,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.agents.len() >= self.params.max_agents
    }

    pub fn n_followers(&self, id: AgentId) -> usize {
        self.follower_counts[id.idx()] as usize
    }

    pub fn follower_set(&self, id: AgentId) -> &FollowerSet {
        &self.follower_sets[id.idx()]
    }

    pub fn follow_rank(&self) -> &RateTree<DegreeClassifier> {
        &self.follow_rank
    }

    pub fn type_rank(&self, ty: AgentTypeId) -> &RateTree<DegreeClassifier> {
        &self.type_rank[ty as usize]
    }

    pub fn type_members(&self, ty: AgentTypeId) -> &CategoricalSet<AgentId> {
        &self.type_members[ty as usize]
    }

    /// Create one agent at `creation_time`, drawing region, type, and the
    /// region-conditioned attributes from the configured weights. Fails
    /// once the preallocated arena is exhausted.
    pub fn create_agent(&mut self, rng: &mut SimRng, creation_time: SimTime) -> Result<AgentId> {
        if self.is_full() {
            return Err(SimError::Capacity(format!(
                "agent arena full at {} agents",
                self.params.max_agents
            )));
        }
        let region = rng
            .pick_weighted(&self.params.region_add_weights)
            .expect("validated region weights");
        let ty = rng
            .pick_weighted(&self.params.type_add_weights)
            .expect("validated type weights");
        let language = rng
            .pick_weighted(&self.params.region_language_weights[region])
            .expect("validated language weights");
        let ideology = rng
            .pick_weighted(&self.params.region_ideology_weights[region])
            .expect("validated ideology weights");
        let preference = rng
            .pick_weighted(&self.params.region_preference_weights[region])
            .expect("validated preference weights");

        let id = self.agents.push(
            ty as AgentTypeId,
            region as RegionId,
            language as LanguageId,
            ideology as IdeologyId,
            preference as PreferenceClassId,
            creation_time,
        );
        self.follower_counts.push(0);
        self.follower_sets.push(RateTree::new(self.follower_classifier(id)));
        self.follow_rank.insert(&self.follower_counts, id);
        self.type_rank[ty].insert(&self.follower_counts, id);
        self.type_members[ty].insert(id);
        Ok(id)
    }

    /// Add the directed edge `from → to`, keeping the follow set, follower
    /// tree, and degree categorizations in step. Self-follows and
    /// duplicates are rejected without touching anything.
    pub fn follow(&mut self, from: AgentId, to: AgentId) -> FollowOutcome {
        if from == to {
            return FollowOutcome::SelfFollow;
        }
        if self.follower_sets[to.idx()].contains(&self.agents, from) {
            return FollowOutcome::Duplicate;
        }
        self.agents.follow_sets[from.idx()].push(to);

        let ty = self.agents.types[to.idx()] as usize;
        // Reclassify the target around the degree change: out under the
        // old count, back in under the new one.
        self.follow_rank.remove(&self.follower_counts, to);
        self.type_rank[ty].remove(&self.follower_counts, to);
        self.follower_sets[to.idx()].insert(&self.agents, from);
        self.follower_counts[to.idx()] += 1;
        self.follow_rank.insert(&self.follower_counts, to);
        self.type_rank[ty].insert(&self.follower_counts, to);
        FollowOutcome::Followed
    }

    pub fn followback_probability(&self, id: AgentId) -> f64 {
        self.params.followback_probability[self.agents.types[id.idx()] as usize]
    }

    /// Remove the edge `follower → target`. Returns false when no such
    /// edge exists.
    pub fn remove_follower(&mut self, target: AgentId, follower: AgentId) -> bool {
        let follow_set = &mut self.agents.follow_sets[follower.idx()];
        let Some(pos) = follow_set.iter().position(|&t| t == target) else {
            return false;
        };
        follow_set.remove(pos);

        let ty = self.agents.types[target.idx()] as usize;
        self.follow_rank.remove(&self.follower_counts, target);
        self.type_rank[ty].remove(&self.follower_counts, target);
        self.follower_sets[target.idx()].remove(&self.agents, follower);
        self.follower_counts[target.idx()] -= 1;
        self.follow_rank.insert(&self.follower_counts, target);
        self.type_rank[ty].insert(&self.follower_counts, target);
        true
    }

    /// Chatty-tweeter unfollow: one uniformly chosen follower drops the
    /// tweeter when the tweeter's tweet rate crosses the absolute
    /// threshold, or (stage1 policy) twice the mean rate of that
    /// follower's followees. Returns whether an edge was removed.
    pub fn maybe_unfollow(
        &mut self,
        rng: &mut SimRng,
        tweeter: AgentId,
        now: SimTime,
        stage1: bool,
        absolute_rate: f64,
    ) -> bool {
        let Some(follower) = self.follower_sets[tweeter.idx()].sample_uniform(rng) else {
            return false;
        };
        let tweeter_rate = self.agents.tweet_rate(tweeter, now);
        let chatty_absolute = absolute_rate > 0.0 && tweeter_rate > absolute_rate;
        let chatty_relative = stage1 && {
            let followees = &self.agents.follow_sets[follower.idx()];
            let mean = followees
                .iter()
                .map(|&t| self.agents.tweet_rate(t, now))
                .sum::<f64>()
                / followees.len().max(1) as f64;
            tweeter_rate > 2.0 * mean
        };
        if chatty_absolute || chatty_relative {
            self.remove_follower(tweeter, follower)
        } else {
            false
        }
    }

    pub fn record_tweet(&mut self, id: AgentId) -> u32 {
        self.agents.tweet_counts[id.idx()] += 1;
        self.agents.tweet_counts[id.idx()]
    }

    pub fn record_retweet(&mut self, id: AgentId) -> u32 {
        self.agents.retweet_counts[id.idx()] += 1;
        self.agents.retweet_counts[id.idx()]
    }

    pub fn record_hashtag_use(&mut self, id: AgentId) {
        self.hashtag_pool.insert(
            self.agents.regions[id.idx()],
            self.agents.ideologies[id.idx()],
            id,
        );
    }

    /// Push a witnessed retweet into the ring buffer of every follower of
    /// `reactor`.
    pub fn push_retweet_to_followers(&mut self, reactor: AgentId, record: RetweetRecord) {
        let followers = &self.follower_sets[reactor.idx()];
        for &f in followers.iter_members() {
            self.agents.retweet_buffers[f.idx()].push(record);
        }
    }

    /// Rebaseline every maintained tree total.
    pub fn rebaseline_rates(&mut self) {
        self.follow_rank.recalc_rates();
        for tree in &mut self.type_rank {
            tree.recalc_rates();
        }
        for set in &mut self.follower_sets {
            set.recalc_rates();
        }
    }

    /// Debug-time structural check: edge symmetry and degree counts.
    #[cfg(test)]
    pub fn check_consistency(&self) {
        for idx in 0..self.agents.len() {
            let follower = AgentId::from_index(idx);
            for &target in &self.agents.follow_sets[idx] {
                assert!(
                    self.follower_sets[target.idx()].contains(&self.agents, follower),
                    "edge {follower:?} -> {target:?} missing from follower set"
                );
            }
        }
        for idx in 0..self.agents.len() {
            let id = AgentId::from_index(idx);
            let in_degree = (0..self.agents.len())
                .filter(|&other| self.agents.follow_sets[other].contains(&id))
                .count();
            assert_eq!(
                in_degree,
                self.n_followers(id),
                "follower count out of step for {id:?}"
            );
            assert_eq!(in_degree, self.follower_sets[idx].len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimConfig;

    fn small_network(max_agents: usize) -> (Network, SimRng) {
        let mut config = SimConfig::default();
        config.analysis.max_agents = max_agents;
        (Network::new(&config), SimRng::from_seed(1234))
    }

    #[test]
    fn degree_bins_are_geometric() {
        let c = DegreeClassifier::geometric(100, 1.0);
        assert_eq!(c.bin_of(0), 0);
        assert_eq!(c.bin_of(1), 1);
        assert_eq!(c.bin_of(2), 2);
        assert_eq!(c.bin_of(3), 2);
        assert_eq!(c.bin_of(4), 3);
        assert_eq!(c.bin_of(63), 6);
        assert_eq!(c.bin_of(64), 7);
        // Degrees past the last threshold pool in the final bin.
        assert_eq!(c.bin_of(1_000_000), c.thresholds.len() - 1);
    }

    #[test]
    fn follow_maintains_symmetry_and_rejections() {
        let (mut net, mut rng) = small_network(10);
        let a = net.create_agent(&mut rng, 0.0).unwrap();
        let b = net.create_agent(&mut rng, 0.0).unwrap();

        assert_eq!(net.follow(a, a), FollowOutcome::SelfFollow);
        assert_eq!(net.follow(a, b), FollowOutcome::Followed);
        assert_eq!(net.follow(a, b), FollowOutcome::Duplicate);
        assert_eq!(net.n_followers(b), 1);
        assert_eq!(net.n_followers(a), 0);
        net.check_consistency();

        assert_eq!(net.follow(b, a), FollowOutcome::Followed);
        net.check_consistency();
    }

    #[test]
    fn capacity_exhaustion_is_an_error() {
        let (mut net, mut rng) = small_network(3);
        for _ in 0..3 {
            net.create_agent(&mut rng, 0.0).unwrap();
        }
        let err = net.create_agent(&mut rng, 0.0).unwrap_err();
        assert!(matches!(err, SimError::Capacity(_)));
        assert_eq!(net.len(), 3);
    }

    #[test]
    fn remove_follower_reverses_follow() {
        let (mut net, mut rng) = small_network(10);
        let a = net.create_agent(&mut rng, 0.0).unwrap();
        let b = net.create_agent(&mut rng, 0.0).unwrap();
        net.follow(a, b);
        assert!(net.remove_follower(b, a));
        assert!(!net.remove_follower(b, a), "edge already gone");
        assert_eq!(net.n_followers(b), 0);
        assert!(net.agents.follow_sets[a.idx()].is_empty());
        net.check_consistency();
    }

    #[test]
    fn degree_rank_tracks_popularity() {
        let (mut net, mut rng) = small_network(20);
        let ids: Vec<AgentId> = (0..10)
            .map(|_| net.create_agent(&mut rng, 0.0).unwrap())
            .collect();
        // Make ids[0] popular.
        for &follower in &ids[1..] {
            assert_eq!(net.follow(follower, ids[0]), FollowOutcome::Followed);
        }
        // The popular agent's bin carries weight (8+1)^1 = 9 against 1 per
        // degree-zero agent, so it should take roughly half of all draws —
        // far above the 1-in-10 a uniform draw would give it.
        let mut hits = 0;
        for _ in 0..2000 {
            if net.follow_rank().sample_weighted(&mut rng) == Some(ids[0]) {
                hits += 1;
            }
        }
        assert!(
            hits > 600,
            "popular agent drawn only {hits}/2000 times from the degree rank (uniform would be ~200)"
        );
    }

    #[test]
    fn unfollow_triggers_on_absolute_threshold() {
        let (mut net, mut rng) = small_network(10);
        let chatty = net.create_agent(&mut rng, 0.0).unwrap();
        let quiet = net.create_agent(&mut rng, 0.0).unwrap();
        net.follow(quiet, chatty);
        for _ in 0..500 {
            net.record_tweet(chatty);
        }
        // 500 tweets in ~10 minutes is far past a 1/min threshold.
        assert!(net.maybe_unfollow(&mut rng, chatty, 10.0, false, 1.0));
        assert_eq!(net.n_followers(chatty), 0);
        // No followers left: nothing further to remove.
        assert!(!net.maybe_unfollow(&mut rng, chatty, 10.0, false, 1.0));
    }

    #[test]
    fn hashtag_pool_filters() {
        let mut pool = HashtagPool::new(2, 2);
        let mut rng = SimRng::from_seed(5);
        pool.insert(0, 0, AgentId(1));
        pool.insert(1, 1, AgentId(2));
        for _ in 0..100 {
            assert_eq!(pool.sample(&mut rng, Some(0), None), Some(AgentId(1)));
            assert_eq!(pool.sample(&mut rng, None, Some(1)), Some(AgentId(2)));
        }
        assert_eq!(pool.sample(&mut rng, Some(0), Some(1)), None);
    }
}
