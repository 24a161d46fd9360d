//! The tweet bank: live tweets under time-decaying reaction rates
//!
//! Tweets sit in a `TimeDepRateTree` keyed by age bin, each carrying
//! `obs_rate[bin] × base_rate` as its live rate. Aging is lazy: nothing
//! touches a tweet until weighted sampling proposes it, at which point its
//! rebin deadline is checked; an expired candidate is advanced one bin (or
//! evicted past the span), its rate is recomputed, and the draw retries.
//! A bounded number of retries guards against livelock when many
//! candidates expire at once; past the bound a linear sweep ages every
//! expired tweet before one final draw.

use ahash::AHashMap;

use crate::core::rng::SimRng;
use crate::core::types::{SimTime, TweetId};
use crate::sampling::time_dep::TimeDepRateTree;
use crate::tweets::observation::ObservationModel;
use crate::tweets::tweet::Tweet;

/// Weighted draws re-attempted before falling back to the expiry sweep.
pub const SAMPLE_RETRY_LIMIT: usize = 16;

#[derive(Debug)]
pub struct TweetBank {
    obs: ObservationModel,
    tweets: AHashMap<TweetId, Tweet>,
    tree: TimeDepRateTree<TweetId>,
    next_id: u64,
}

impl TweetBank {
    pub fn new(obs: ObservationModel) -> Self {
        let tree = TimeDepRateTree::new(obs.n_bins());
        Self {
            obs,
            tweets: AHashMap::new(),
            tree,
            next_id: 0,
        }
    }

    pub fn observation(&self) -> &ObservationModel {
        &self.obs
    }

    pub fn len(&self) -> usize {
        self.tweets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty()
    }

    /// Summed live reaction rate of every tweet; one of the top-level
    /// event-class rates.
    pub fn total_rate(&self) -> f64 {
        self.tree.total_rate()
    }

    pub fn get(&self, id: TweetId) -> Option<&Tweet> {
        self.tweets.get(&id)
    }

    /// Register a freshly posted tweet. `base_rate` is the tweet's
    /// transmission-weighted reach at posting time.
    pub fn post(&mut self, mut tweet: Tweet, now: SimTime) -> TweetId {
        let id = TweetId(self.next_id);
        self.next_id += 1;
        tweet.id = id;
        tweet.age_bin = 0;
        tweet.next_rebin_time = tweet.creation_time + self.obs.rebin_threshold(0);
        let rate = self.obs.obs_rate(0) * tweet.base_rate;
        debug_assert!(now >= tweet.creation_time, "tweets cannot be posted in the past");
        self.tree.insert(id, 0, rate);
        self.tweets.insert(id, tweet);
        id
    }

    /// Restore a tweet from a snapshot with its cached bin intact. Tweets
    /// whose bin does not exist under the current observation model (a
    /// digest-override reload) are dropped.
    pub fn restore(&mut self, tweet: Tweet) {
        self.next_id = self.next_id.max(tweet.id.0 + 1);
        if tweet.age_bin >= self.obs.n_bins() {
            return;
        }
        let rate = self.obs.obs_rate(tweet.age_bin) * tweet.base_rate;
        self.tree.insert(tweet.id, tweet.age_bin, rate);
        self.tweets.insert(tweet.id, tweet);
    }

    /// Weighted draw of a reacting tweet at simulated time `now`.
    ///
    /// `refresh_reach` recomputes a tweet's transmission-weighted reach
    /// from the current network when the tweet changes bin.
    pub fn sample_reacting_tweet(
        &mut self,
        rng: &mut SimRng,
        now: SimTime,
        refresh_reach: impl Fn(&Tweet) -> f64,
    ) -> Option<TweetId> {
        for _ in 0..SAMPLE_RETRY_LIMIT {
            let candidate = self.tree.sample_weighted(rng)?;
            if self.check_candidate(candidate, now, &refresh_reach) {
                return Some(candidate);
            }
        }
        // Too many expired candidates in a row; age everything that is due
        // and draw once more against clean rates.
        self.sweep_expired(now, &refresh_reach);
        let candidate = self.tree.sample_weighted(rng)?;
        self.check_candidate(candidate, now, &refresh_reach)
            .then_some(candidate)
    }

    /// Verify a sampling candidate's age bin, migrating or evicting it if
    /// its rebin deadline has passed. Returns false when the draw must be
    /// retried.
    fn check_candidate(
        &mut self,
        id: TweetId,
        now: SimTime,
        refresh_reach: &impl Fn(&Tweet) -> f64,
    ) -> bool {
        let tweet = self.tweets.get_mut(&id).expect("tree and map in step");
        if now <= tweet.next_rebin_time {
            return true;
        }
        tweet.age_bin += 1;
        let age = now - tweet.creation_time;
        if tweet.age_bin >= self.obs.n_bins() || age >= self.obs.span() {
            self.tree.remove(&id);
            self.tweets.remove(&id);
            return false;
        }
        tweet.next_rebin_time = tweet.creation_time + self.obs.rebin_threshold(tweet.age_bin);
        tweet.base_rate = refresh_reach(tweet);
        let rate = self.obs.obs_rate(tweet.age_bin) * tweet.base_rate;
        self.tree.move_bin(id, tweet.age_bin, rate);
        false
    }

    /// Bring every overdue tweet to its correct bin in one pass, evicting
    /// those past the observation span.
    pub fn sweep_expired(&mut self, now: SimTime, refresh_reach: &impl Fn(&Tweet) -> f64) {
        let due: Vec<TweetId> = self
            .tweets
            .values()
            .filter(|t| now > t.next_rebin_time)
            .map(|t| t.id)
            .collect();
        for id in due {
            let tweet = self.tweets.get_mut(&id).expect("listed above");
            let age = now - tweet.creation_time;
            match self.obs.bin_for_age(age) {
                None => {
                    self.tree.remove(&id);
                    self.tweets.remove(&id);
                }
                Some(bin) => {
                    tweet.age_bin = bin;
                    tweet.next_rebin_time = tweet.creation_time + self.obs.rebin_threshold(bin);
                    tweet.base_rate = refresh_reach(tweet);
                    let rate = self.obs.obs_rate(bin) * tweet.base_rate;
                    self.tree.move_bin(id, bin, rate);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tweet> {
        self.tweets.values()
    }

    /// Rebaseline the tree totals against accumulated floating drift.
    pub fn rebaseline(&mut self) {
        self.tree.recalc_totals();
    }
}
