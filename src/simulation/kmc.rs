//! The kinetic Monte Carlo event loop
//!
//! One step: poll the abort counter, assemble the event-class partition,
//! draw a class, sample the acting entity from the matching rate tree,
//! apply the action, advance simulated time by an interval drawn from the
//! total rate, and service milestones. A step runs to completion; nothing
//! in it blocks, and cancellation is only ever observed between steps.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::config::{FollowModel, SimConfig};
use crate::core::error::{Result, SimError};
use crate::core::rng::SimRng;
use crate::core::types::{
    AgentId, SimTime, TweetId, CTRL_C_ATTEMPTS_TO_ABORT, RETWEET_FRESHNESS_WINDOW, TIME_CAT_FREQ,
    ZEROTOL,
};
use crate::network::agent::RetweetRecord;
use crate::network::follow_models::{select_follow_target, FollowModelParams};
use crate::network::graph::{FollowOutcome, Network};
use crate::sampling::tree::RateTree;
use crate::simulation::output::{dump_agent_stats, dump_graph, SummaryWriter};
use crate::simulation::rates::{EventClass, EventClassifier, EventRates, RateFunction};
use crate::simulation::snapshot::{self, Snapshot};
use crate::tweets::bank::TweetBank;
use crate::tweets::observation::ObservationModel;
use crate::tweets::transmission::TransmissionParams;
use crate::tweets::tweet::{Tweet, TweetContent};

/// Monotonic abort counter shared with an interrupt handler. One raise
/// requests a graceful halt at the next step boundary; more than
/// `CTRL_C_ATTEMPTS_TO_ABORT` demands an immediate abort.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicU32>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimStats {
    pub n_steps: u64,
    pub n_follows: u64,
    pub n_tweets: u64,
    pub n_retweets: u64,
    pub n_followbacks: u64,
    pub n_unfollows: u64,
    /// Rejected follow attempts: self-follows and duplicates.
    pub n_rejected_follows: u64,
    /// Steps whose selection produced no applicable entity.
    pub n_null_events: u64,
    /// Global event rate of the most recent step.
    pub event_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimeLimit,
    StepLimit,
    WallClockLimit,
    /// No event class carries rate any more; nothing can ever happen.
    RatesExhausted,
    /// Graceful halt after a single abort request.
    Aborted,
}

pub struct Simulation {
    config: SimConfig,
    transmission: TransmissionParams,
    follow_params: FollowModelParams,
    barabasi_params: FollowModelParams,
    add_rate: RateFunction,
    /// Content-kind weights per agent type, ordered plain, ideological,
    /// musical, humorous.
    tweet_type_weights: Vec<[f64; 4]>,
    pub rng: SimRng,
    pub network: Network,
    pub bank: TweetBank,
    follow_events: RateTree<EventClassifier>,
    tweet_events: RateTree<EventClassifier>,
    pub stats: SimStats,
    pub time: SimTime,
    current_month: u32,
    milestone_populations: Vec<usize>,
    writer: Option<SummaryWriter>,
    abort: AbortFlag,
    wall_start: Instant,
}

impl Simulation {
    pub fn new(config: SimConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut sim = Self::assemble(config, SimRng::from_seed(seed))?;
        for _ in 0..sim.config.analysis.initial_agents {
            sim.action_add_agent()?;
        }
        Ok(sim)
    }

    /// Resume from a snapshot. Derived structures are rebuilt from the
    /// restored primary state.
    pub fn from_snapshot(config: SimConfig, snap: Snapshot) -> Result<Self> {
        config.validate()?;
        let mut sim = Self::assemble(config, snap.rng)?;
        sim.network = Network::from_agents(&sim.config, snap.agents)?;
        sim.time = snap.time;
        sim.current_month = snap.current_month;
        sim.stats = snap.stats;
        sim.milestone_populations = snap.milestone_populations;
        sim.follow_events.classifier_mut().current_month = snap.current_month;
        sim.tweet_events.classifier_mut().current_month = snap.current_month;
        for idx in 0..sim.network.len() {
            let id = AgentId::from_index(idx);
            sim.follow_events.insert(&sim.network.agents, id);
            sim.tweet_events.insert(&sim.network.agents, id);
        }
        for tweet in snap.tweets {
            sim.bank.restore(tweet);
        }
        Ok(sim)
    }

    fn assemble(config: SimConfig, rng: SimRng) -> Result<Self> {
        let obs = ObservationModel::from_config(&config.tweet_observation)?;
        let follow_params = FollowModelParams {
            model: config.analysis.follow_model,
            model_weights: config.analysis.model_weights.clone(),
            use_follow_via_retweets: config.analysis.use_follow_via_retweets,
        };
        let barabasi_params = FollowModelParams {
            model: FollowModel::TwitterSuggest,
            model_weights: config.analysis.model_weights.clone(),
            use_follow_via_retweets: false,
        };
        let follow_rates: Vec<f64> = config.agent_types.iter().map(|t| t.rates.follow).collect();
        let tweet_rates: Vec<f64> = config.agent_types.iter().map(|t| t.rates.tweet).collect();
        let tweet_type_weights = config
            .agent_types
            .iter()
            .map(|t| {
                let w = &t.weights.tweet_type;
                [w.plain, w.ideological, w.musical, w.humorous]
            })
            .collect();
        let writer = if config.output.summary_output {
            Some(SummaryWriter::create(
                &config.output.summary_file,
                config.output.stdout_summary,
            )?)
        } else {
            None
        };
        Ok(Self {
            transmission: TransmissionParams::from_config(&config),
            follow_params,
            barabasi_params,
            add_rate: RateFunction::from_config(&config.rates.add),
            tweet_type_weights,
            rng,
            network: Network::new(&config),
            bank: TweetBank::new(obs),
            follow_events: RateTree::new(EventClassifier {
                rate_per_type: follow_rates,
                current_month: 0,
            }),
            tweet_events: RateTree::new(EventClassifier {
                rate_per_type: tweet_rates,
                current_month: 0,
            }),
            stats: SimStats::default(),
            time: 0.0,
            current_month: 0,
            milestone_populations: Vec::new(),
            writer,
            abort: AbortFlag::new(),
            wall_start: Instant::now(),
            config,
        })
    }

    /// Handle an interrupt source can raise from another thread.
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    pub fn milestone_populations(&self) -> &[usize] {
        &self.milestone_populations
    }

    fn current_rates(&self) -> EventRates {
        EventRates::compute(
            &self.add_rate,
            self.time,
            self.network.len(),
            self.config.analysis.max_agents,
            self.follow_events.total_rate(),
            self.tweet_events.total_rate(),
            self.bank.total_rate(),
        )
    }

    /// Run until a bound, exhaustion, or abort. Output sinks are closed on
    /// every exit path, including the error ones.
    pub fn run(&mut self) -> Result<StopReason> {
        let reason = loop {
            let aborts = self.abort.count();
            if aborts > CTRL_C_ATTEMPTS_TO_ABORT {
                self.teardown(false);
                return Err(SimError::Aborted);
            }
            if aborts >= 1 {
                break StopReason::Aborted;
            }
            if self.time >= self.config.analysis.max_time.bound() {
                break StopReason::TimeLimit;
            }
            if let Some(max_steps) = self.config.analysis.max_analysis_steps {
                if self.stats.n_steps >= max_steps {
                    break StopReason::StepLimit;
                }
            }
            if let Some(max_real) = self.config.analysis.max_real_time {
                if self.wall_start.elapsed().as_secs_f64() / 60.0 >= max_real {
                    break StopReason::WallClockLimit;
                }
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => break StopReason::RatesExhausted,
                Err(err) => {
                    self.teardown(true);
                    return Err(err);
                }
            }
        };
        tracing::info!(?reason, steps = self.stats.n_steps, time = self.time, "simulation finished");
        self.teardown(true);
        Ok(reason)
    }

    /// At most `n` steps; stops early on rate exhaustion.
    pub fn run_steps(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            if !self.step()? {
                break;
            }
        }
        Ok(())
    }

    /// One KMC step. `Ok(false)` means no event class carries rate and the
    /// simulation can never advance again.
    pub fn step(&mut self) -> Result<bool> {
        let rates = self.current_rates();
        self.stats.event_rate = rates.total;
        if rates.total <= ZEROTOL {
            return Ok(false);
        }
        let u = self.rng.open01();
        match rates.choose(u).expect("positive total rate") {
            EventClass::AddAgent => self.action_add_agent()?,
            EventClass::Follow => self.action_follow(),
            EventClass::Tweet => self.action_tweet(),
            EventClass::Retweet => self.action_retweet(),
        }
        self.advance_time(rates.total);
        self.stats.n_steps += 1;
        if self.stats.n_steps % self.config.analysis.rate_rebaseline_interval == 0 {
            self.rebaseline();
        }
        Ok(true)
    }

    fn action_add_agent(&mut self) -> Result<()> {
        let id = self.network.create_agent(&mut self.rng, self.time)?;
        self.follow_events.insert(&self.network.agents, id);
        self.tweet_events.insert(&self.network.agents, id);
        if self.config.analysis.use_barabasi {
            for _ in 0..self.config.analysis.barabasi_connections {
                let Some(target) = select_follow_target(
                    &self.network,
                    &mut self.rng,
                    &self.barabasi_params,
                    id,
                    self.time,
                ) else {
                    break;
                };
                self.apply_follow(id, target);
            }
        }
        Ok(())
    }

    fn action_follow(&mut self) {
        let Some(actor) = self.follow_events.sample_weighted(&mut self.rng) else {
            self.stats.n_null_events += 1;
            return;
        };
        let Some(target) =
            select_follow_target(&self.network, &mut self.rng, &self.follow_params, actor, self.time)
        else {
            self.stats.n_null_events += 1;
            return;
        };
        self.apply_follow(actor, target);
    }

    fn apply_follow(&mut self, from: AgentId, to: AgentId) {
        match self.network.follow(from, to) {
            FollowOutcome::Followed => {
                self.stats.n_follows += 1;
                if self.config.analysis.use_followback {
                    let p = self.network.followback_probability(to);
                    if self.rng.chance(p)
                        && self.network.follow(to, from) == FollowOutcome::Followed
                    {
                        self.stats.n_follows += 1;
                        self.stats.n_followbacks += 1;
                    }
                }
            }
            FollowOutcome::SelfFollow | FollowOutcome::Duplicate => {
                self.stats.n_rejected_follows += 1;
            }
        }
    }

    fn action_tweet(&mut self) {
        let Some(actor) = self.tweet_events.sample_weighted(&mut self.rng) else {
            self.stats.n_null_events += 1;
            return;
        };
        self.network.record_tweet(actor);
        let ty = self.network.agents.types[actor.idx()] as usize;
        let content = match self
            .rng
            .pick_weighted(&self.tweet_type_weights[ty])
            .expect("validated tweet-type weights")
        {
            0 => TweetContent::Plain,
            1 => TweetContent::Ideological,
            2 => TweetContent::Musical,
            _ => TweetContent::Humorous,
        };
        let hashtag = self.rng.chance(self.config.analysis.use_hashtag_probability);
        if hashtag {
            self.network.record_hashtag_use(actor);
        }
        let mut tweet = Tweet {
            id: TweetId(0),
            tweeter: actor,
            content,
            ideology: self.network.agents.ideologies[actor.idx()],
            language: self.network.agents.languages[actor.idx()],
            hashtag,
            creation_time: self.time,
            age_bin: 0,
            next_rebin_time: 0.0,
            base_rate: 0.0,
        };
        tweet.base_rate = self.transmission.reach(&self.network, &tweet);
        self.bank.post(tweet, self.time);
        self.stats.n_tweets += 1;

        let analysis = &self.config.analysis;
        if analysis.stage1_unfollow || analysis.unfollow_tweet_rate > 0.0 {
            let stage1 = analysis.stage1_unfollow;
            let threshold = analysis.unfollow_tweet_rate;
            if self
                .network
                .maybe_unfollow(&mut self.rng, actor, self.time, stage1, threshold)
            {
                self.stats.n_unfollows += 1;
            }
        }
    }

    fn action_retweet(&mut self) {
        let bank = &mut self.bank;
        let network = &self.network;
        let rng = &mut self.rng;
        let transmission = &self.transmission;
        let time = self.time;

        let Some(tid) = bank.sample_reacting_tweet(rng, time, |t| transmission.reach(network, t))
        else {
            self.stats.n_null_events += 1;
            return;
        };
        let tweet = bank.get(tid).cloned().expect("sampled tweet is live");
        let tweeter_type = network.agents.types[tweet.tweeter.idx()] as usize;
        let Some(reactor) = network
            .follower_set(tweet.tweeter)
            .sample_weighted_with(rng, |path| transmission.leaf_weight(&tweet, tweeter_type, path))
        else {
            self.stats.n_null_events += 1;
            return;
        };

        // The reactor either passes along one of its own followees or
        // re-propagates its freshest witnessed retweet.
        let original = if rng.chance(0.5) {
            let followees = &network.agents.follow_sets[reactor.idx()];
            if followees.is_empty() {
                None
            } else {
                Some(followees[rng.uniform_index(followees.len())])
            }
        } else {
            network.agents.retweet_buffers[reactor.idx()]
                .most_recent()
                .and_then(|rec| {
                    (time - rec.time < RETWEET_FRESHNESS_WINDOW).then_some(rec.original_tweeter)
                })
        };
        let Some(original_tweeter) = original else {
            self.stats.n_null_events += 1;
            return;
        };

        self.network
            .push_retweet_to_followers(reactor, RetweetRecord { original_tweeter, time });
        self.network.record_retweet(reactor);
        self.stats.n_retweets += 1;
    }

    fn advance_time(&mut self, total_rate: f64) {
        let dt = if self.config.analysis.use_random_time_increment {
            -self.rng.open01().ln() / total_rate
        } else {
            1.0 / total_rate
        };
        let prev_whole = self.time.floor();
        self.time += dt;

        // Month milestones: record the population and advance the
        // age-binned event trees, once per crossed boundary.
        let new_month = (self.time / TIME_CAT_FREQ) as u32;
        while self.current_month < new_month {
            self.current_month += 1;
            self.milestone_populations.push(self.network.len());
            self.follow_events.classifier_mut().current_month = self.current_month;
            self.tweet_events.classifier_mut().current_month = self.current_month;
            self.follow_events.shift_bins();
            self.tweet_events.shift_bins();
        }

        if self.time.floor() > prev_whole {
            if let Some(writer) = self.writer.as_mut() {
                writer.write_row(
                    self.time,
                    self.network.len(),
                    self.stats.n_follows,
                    self.stats.n_tweets,
                    self.stats.n_retweets,
                );
            }
        }
    }

    /// Recompute every cached tree total bottom-up, wiping accumulated
    /// floating drift.
    fn rebaseline(&mut self) {
        self.follow_events.recalc_rates();
        self.tweet_events.recalc_rates();
        self.network.rebaseline_rates();
        self.bank.rebaseline();
    }

    /// Close output sinks; optionally write the configured final dumps.
    /// Runs on every exit path, including hard abort (which skips the
    /// dumps).
    fn teardown(&mut self, write_outputs: bool) {
        if write_outputs {
            if let Some(writer) = self.writer.as_mut() {
                writer.write_row(
                    self.time,
                    self.network.len(),
                    self.stats.n_follows,
                    self.stats.n_tweets,
                    self.stats.n_retweets,
                );
            }
        }
        // Dropping the writer flushes and closes the stream.
        self.writer = None;

        if !write_outputs {
            return;
        }
        if let Some(path) = self.config.output.graph_file.clone() {
            if let Err(err) = dump_graph(&self.network, &path) {
                tracing::warn!(%err, "graph dump failed");
            }
        }
        if let Some(path) = self.config.output.agent_stats_file.clone() {
            if let Err(err) = dump_agent_stats(&self.network, &path) {
                tracing::warn!(%err, "agent stats dump failed");
            }
        }
        if let Some(path) = self.config.output.snapshot_file.clone() {
            let snap = self.to_snapshot();
            if let Err(err) = snapshot::save(&path, &snap) {
                tracing::warn!(%err, "snapshot write failed");
            }
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            config_digest: self.config.digest(),
            time: self.time,
            current_month: self.current_month,
            stats: self.stats.clone(),
            rng: self.rng.clone(),
            agents: self.network.agents.clone(),
            tweets: self.bank.iter().cloned().collect(),
            milestone_populations: self.milestone_populations.clone(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}
