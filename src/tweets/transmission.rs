//! Tweet-transmission weighting over follower categories
//!
//! A follower's inclination to react to a tweet depends on the follower's
//! preference class, the tweet's content relative to the follower
//! (same/different ideology for ideological content), and the tweeter's
//! agent type. Language gates everything except musical content, which
//! crosses language lines.
//!
//! The same weight function serves two purposes: summed over a follower
//! tree it gives a tweet's base reaction rate, and per-leaf it weights the
//! selection of the reacting follower.

use crate::core::config::SimConfig;
use crate::network::graph::{Network, IDEOLOGY_SAME};
use crate::tweets::tweet::{Tweet, TweetContent};

/// Transmission tables flattened for the hot path:
/// `rows[relation][pref_class × n_types + tweeter_type]`.
#[derive(Debug, Clone)]
pub struct TransmissionParams {
    n_types: usize,
    plain: Vec<f64>,
    same_ideology: Vec<f64>,
    different_ideology: Vec<f64>,
    humorous: Vec<f64>,
}

impl TransmissionParams {
    pub fn from_config(config: &SimConfig) -> Self {
        let n_types = config.agent_types.len();
        let flatten = |select: fn(&crate::core::config::TransmissionTable) -> &Vec<f64>| {
            config
                .preference_classes
                .iter()
                .flat_map(|p| select(&p.tweet_transmission).iter().copied())
                .collect::<Vec<f64>>()
        };
        Self {
            n_types,
            plain: flatten(|t| &t.plain),
            same_ideology: flatten(|t| &t.same_ideology),
            different_ideology: flatten(|t| &t.different_ideology),
            humorous: flatten(|t| &t.humorous),
        }
    }

    /// Reaction-rate multiplier for a follower-tree leaf
    /// `(language, ideology distance, preference class)` reacting to
    /// `tweet`.
    pub fn leaf_weight(&self, tweet: &Tweet, tweeter_type: usize, path: &[usize]) -> f64 {
        let (language, distance, pref) = (path[0], path[1], path[2]);
        if language != tweet.language as usize && tweet.content != TweetContent::Musical {
            return 0.0;
        }
        let row = match tweet.content {
            TweetContent::Plain | TweetContent::Musical => &self.plain,
            TweetContent::Humorous => &self.humorous,
            TweetContent::Ideological => {
                if distance == IDEOLOGY_SAME {
                    &self.same_ideology
                } else {
                    &self.different_ideology
                }
            }
        };
        row[pref * self.n_types + tweeter_type]
    }

    /// Transmission-weighted size of the tweeter's current follower tree:
    /// the tweet's base reaction rate.
    pub fn reach(&self, net: &Network, tweet: &Tweet) -> f64 {
        let tweeter_type = net.agents.types[tweet.tweeter.idx()] as usize;
        net.follower_set(tweet.tweeter)
            .weighted_total_with(|path| self.leaf_weight(tweet, tweeter_type, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimConfig;
    use crate::core::types::{AgentId, TweetId};

    fn tweet(content: TweetContent, language: u16, ideology: u16) -> Tweet {
        Tweet {
            id: TweetId(0),
            tweeter: AgentId(0),
            content,
            ideology,
            language,
            hashtag: false,
            creation_time: 0.0,
            age_bin: 0,
            next_rebin_time: 0.0,
            base_rate: 0.0,
        }
    }

    #[test]
    fn language_gates_all_but_musical() {
        let mut config = SimConfig::default();
        config.preference_classes[0].tweet_transmission.plain = vec![2.0];
        let params = TransmissionParams::from_config(&config);

        let plain = tweet(TweetContent::Plain, 0, 0);
        assert_eq!(params.leaf_weight(&plain, 0, &[0, 0, 0]), 2.0);
        assert_eq!(params.leaf_weight(&plain, 0, &[1, 0, 0]), 0.0, "other language");

        let musical = tweet(TweetContent::Musical, 0, 0);
        assert_eq!(params.leaf_weight(&musical, 0, &[1, 0, 0]), 2.0, "music crosses language");
    }

    #[test]
    fn ideological_content_splits_on_distance() {
        let mut config = SimConfig::default();
        config.preference_classes[0].tweet_transmission.same_ideology = vec![3.0];
        config.preference_classes[0].tweet_transmission.different_ideology = vec![0.5];
        let params = TransmissionParams::from_config(&config);

        let t = tweet(TweetContent::Ideological, 0, 0);
        assert_eq!(params.leaf_weight(&t, 0, &[0, IDEOLOGY_SAME, 0]), 3.0);
        assert_eq!(params.leaf_weight(&t, 0, &[0, 1, 0]), 0.5);
    }
}
