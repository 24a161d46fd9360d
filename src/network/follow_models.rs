//! Follow-target selection
//!
//! Each model answers one question: given that `follower` is about to
//! follow someone, who? A `None` answer is a normal outcome (empty
//! category, stale buffer, lone agent) that the caller records as a null
//! event.

use crate::core::config::FollowModel;
use crate::core::rng::SimRng;
use crate::core::types::{AgentId, SimTime, RETWEET_FRESHNESS_WINDOW};
use crate::network::graph::Network;

/// Bounds the self-rejection loop of the `random` model; with two or more
/// agents the expected iteration count is under two.
const RANDOM_RETRY_LIMIT: usize = 32;

/// Selection knobs distilled from the analysis configuration.
#[derive(Debug, Clone)]
pub struct FollowModelParams {
    pub model: FollowModel,
    /// Sub-model weights for the combined model, ordered random,
    /// twitter_suggest, agent, preferential_agent, hashtag.
    pub model_weights: Vec<f64>,
    pub use_follow_via_retweets: bool,
}

/// Pick who `follower` should follow.
///
/// When follow-via-retweets is enabled the ring buffer takes precedence
/// over the configured model, combined or not: half the time the most
/// recent witnessed retweet nominates its original tweeter, provided it is
/// fresher than the 48-hour window; the other half falls back to a
/// uniform draw.
pub fn select_follow_target(
    net: &Network,
    rng: &mut SimRng,
    params: &FollowModelParams,
    follower: AgentId,
    now: SimTime,
) -> Option<AgentId> {
    if params.use_follow_via_retweets {
        return select_retweet_based(net, rng, follower, now);
    }
    select_by_model(net, rng, params, params.model, follower)
}

fn select_retweet_based(
    net: &Network,
    rng: &mut SimRng,
    follower: AgentId,
    now: SimTime,
) -> Option<AgentId> {
    if rng.chance(0.5) {
        let record = net.agents.retweet_buffers[follower.idx()].most_recent()?;
        if now - record.time < RETWEET_FRESHNESS_WINDOW {
            Some(record.original_tweeter)
        } else {
            None
        }
    } else {
        select_random(net, rng, follower)
    }
}

fn select_by_model(
    net: &Network,
    rng: &mut SimRng,
    params: &FollowModelParams,
    model: FollowModel,
    follower: AgentId,
) -> Option<AgentId> {
    match model {
        FollowModel::Random => select_random(net, rng, follower),
        FollowModel::TwitterSuggest => net.follow_rank().sample_weighted(rng),
        FollowModel::Agent => {
            let ty = rng.pick_weighted(&net.params().type_follow_weights)?;
            net.type_members(ty as u16).sample_uniform(rng)
        }
        FollowModel::PreferentialAgent => {
            let ty = rng.pick_weighted(&net.params().type_follow_weights)?;
            net.type_rank(ty as u16).sample_weighted(rng)
        }
        FollowModel::Hashtag => select_hashtag(net, rng, follower),
        FollowModel::Twitter => {
            let sub = match rng.pick_weighted(&params.model_weights)? {
                0 => FollowModel::Random,
                1 => FollowModel::TwitterSuggest,
                2 => FollowModel::Agent,
                3 => FollowModel::PreferentialAgent,
                _ => FollowModel::Hashtag,
            };
            select_by_model(net, rng, params, sub, follower)
        }
    }
}

/// Uniform over existing agents, rejection-sampling the follower itself.
fn select_random(net: &Network, rng: &mut SimRng, follower: AgentId) -> Option<AgentId> {
    let n = net.len();
    if n < 2 {
        return None;
    }
    for _ in 0..RANDOM_RETRY_LIMIT {
        let candidate = AgentId::from_index(rng.uniform_index(n));
        if candidate != follower {
            return Some(candidate);
        }
    }
    None
}

/// Someone who recently used a hashtag, filtered by the follower's
/// configured region/ideology preferences.
fn select_hashtag(net: &Network, rng: &mut SimRng, follower: AgentId) -> Option<AgentId> {
    let ty = net.agents.types[follower.idx()] as usize;
    let (care_region, care_ideology) = net.params().hashtag_options[ty];
    let region = care_region.then(|| net.agents.regions[follower.idx()]);
    let ideology = care_ideology.then(|| net.agents.ideologies[follower.idx()]);
    net.hashtag_pool.sample(rng, region, ideology)
}
