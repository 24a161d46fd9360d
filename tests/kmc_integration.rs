//! End-to-end scenarios for the KMC loop
//!
//! Each test builds a deliberately narrow configuration so one event class
//! dominates and the outcome has a sharp expectation.

use std::path::PathBuf;

use chirpnet::core::config::{FollowModel, MaxTime, SimConfig};
use chirpnet::core::error::SimError;
use chirpnet::simulation::kmc::{Simulation, StopReason};

/// Baseline: no file output, no stochastic extras.
fn quiet_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.output.summary_output = false;
    config.agent_types[0].rates.follow = 0.0;
    config.agent_types[0].rates.tweet = 0.0;
    config.rates.add.value = 0.0;
    config
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("chirpnet_it_{}_{name}", std::process::id()))
}

#[test]
fn empty_network_poisson_add() {
    // Only agent creation carries rate: 0.001/min over 1000 minutes. The
    // loop applies an event before advancing the clock, so the final
    // population is one renewal ahead of the Poisson(1) arrival count.
    let mut totals = 0usize;
    let runs = 60;
    for seed in 0..runs {
        let mut config = quiet_config();
        config.analysis.initial_agents = 0;
        config.analysis.max_time = MaxTime::Minutes(1000.0);
        config.rates.add.value = 0.001;
        let mut sim = Simulation::new(config, 1000 + seed).unwrap();
        let reason = sim.run().unwrap();
        assert_eq!(reason, StopReason::TimeLimit);
        assert_eq!(sim.stats.n_follows, 0, "no follow rate configured");
        assert_eq!(sim.stats.n_tweets, 0, "no tweet rate configured");
        assert!(sim.network.len() >= 1, "the first arrival always lands");
        assert!(
            sim.network.len() <= 9,
            "Poisson(1) run produced {} agents",
            sim.network.len()
        );
        totals += sim.network.len() - 1;
    }
    let mean = totals as f64 / runs as f64;
    assert!(
        (0.5..=1.6).contains(&mean),
        "mean arrivals past the first {mean} far from the Poisson(1) expectation"
    );
}

#[test]
fn random_follow_chain_runs_one_event_per_step() {
    // Ten seeded agents, only follow events (0.1/agent/min), deterministic
    // time increments: every step is a follow event and time advances by
    // exactly 1/(10 × 0.1) = 1 minute.
    let mut config = quiet_config();
    config.analysis.initial_agents = 10;
    config.analysis.max_agents = 10;
    config.analysis.max_analysis_steps = Some(10_000);
    config.analysis.use_random_time_increment = false;
    config.analysis.follow_model = FollowModel::Random;
    config.agent_types[0].rates.follow = 0.1;

    let mut sim = Simulation::new(config, 7).unwrap();
    let reason = sim.run().unwrap();
    assert_eq!(reason, StopReason::StepLimit);
    assert_eq!(sim.stats.n_steps, 10_000);
    assert!((sim.time - 10_000.0).abs() < 1.0, "time is {}", sim.time);

    // Every step attempted a follow; attempts either landed or were
    // rejected as duplicates (the random model never proposes self).
    assert_eq!(
        sim.stats.n_follows + sim.stats.n_rejected_follows + sim.stats.n_null_events,
        10_000
    );
    assert_eq!(sim.stats.n_null_events, 0);

    // No self-edges, no duplicate edges anywhere.
    for idx in 0..sim.network.len() {
        let follows = &sim.network.agents.follow_sets[idx];
        assert!(
            follows.iter().all(|t| t.idx() != idx),
            "agent {idx} follows itself"
        );
        let mut sorted: Vec<_> = follows.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), follows.len(), "agent {idx} holds duplicate edges");
    }
    // With 10 agents the graph saturates at 90 edges.
    let edge_count: usize = (0..sim.network.len())
        .map(|i| sim.network.agents.follow_sets[i].len())
        .sum();
    assert_eq!(edge_count as u64, sim.stats.n_follows);
    assert_eq!(edge_count, 90, "10-agent graph should saturate under 10k attempts");
}

#[test]
fn preferential_attachment_skews_the_degree_distribution() {
    // Grow a network Barabási-style: every new agent immediately performs
    // two degree-weighted follows. The top 1% of agents must end up with
    // at least five times the follower share a uniform process would give
    // them.
    let mut config = quiet_config();
    config.analysis.initial_agents = 10;
    config.analysis.max_agents = 2000;
    config.rates.add.value = 1.0;
    config.analysis.use_barabasi = true;
    config.analysis.barabasi_connections = 2;
    config.analysis.barabasi_exponent = 1.0;

    let mut sim = Simulation::new(config, 4242).unwrap();
    let reason = sim.run().unwrap();
    // Once the population cap pins the add rate, nothing carries rate.
    assert_eq!(reason, StopReason::RatesExhausted);
    assert_eq!(sim.network.len(), 2000);
    assert!(sim.stats.n_follows > 3000, "got {} follows", sim.stats.n_follows);

    let mut degrees: Vec<usize> = (0..sim.network.len())
        .map(|i| sim.network.n_followers(chirpnet::core::types::AgentId::from_index(i)))
        .collect();
    degrees.sort_unstable_by(|a, b| b.cmp(a));
    let total_edges: usize = degrees.iter().sum();
    let top_share: f64 = degrees[..20].iter().sum::<usize>() as f64 / total_edges as f64;
    // Uniform attachment would give the top 20 of 2000 agents ~1% of the
    // edges; preferential attachment concentrates far more.
    assert!(
        top_share >= 0.05,
        "top-1% follower share {top_share:.3} lacks the power-law signature"
    );
}

#[test]
fn forced_followback_reciprocates_in_the_same_step() {
    // Two agents, follow events only, followback probability 1: the very
    // first step must produce both directions.
    let mut config = quiet_config();
    config.analysis.initial_agents = 2;
    config.analysis.max_agents = 2;
    config.analysis.max_analysis_steps = Some(1);
    config.analysis.use_followback = true;
    config.analysis.follow_model = FollowModel::Random;
    config.agent_types[0].rates.follow = 0.1;
    config.agent_types[0].followback_probability = 1.0;

    let mut sim = Simulation::new(config, 11).unwrap();
    sim.run().unwrap();
    assert_eq!(sim.stats.n_follows, 2, "primary follow plus followback");
    assert_eq!(sim.stats.n_followbacks, 1);
    let a = &sim.network.agents.follow_sets[0];
    let b = &sim.network.agents.follow_sets[1];
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].idx(), 1);
    assert_eq!(b[0].idx(), 0);
}

#[test]
fn simulated_time_is_monotone() {
    let mut config = quiet_config();
    config.analysis.initial_agents = 5;
    config.analysis.max_agents = 50;
    config.rates.add.value = 0.01;
    config.agent_types[0].rates.follow = 0.05;
    config.agent_types[0].rates.tweet = 0.05;

    let mut sim = Simulation::new(config, 3).unwrap();
    let mut last = sim.time;
    for _ in 0..5000 {
        if !sim.step().unwrap() {
            break;
        }
        assert!(sim.time >= last, "time went backwards: {last} -> {}", sim.time);
        last = sim.time;
    }
    assert!(sim.time > 0.0);
}

#[test]
fn graceful_abort_stops_within_one_step() {
    let mut config = quiet_config();
    config.analysis.initial_agents = 10;
    config.analysis.max_agents = 10;
    config.analysis.follow_model = FollowModel::Random;
    config.agent_types[0].rates.follow = 0.1;
    config.output.summary_output = true;
    config.output.summary_file = temp_path("abort_series.dat");

    let mut sim = Simulation::new(config.clone(), 5).unwrap();
    sim.run_steps(1000).unwrap();
    assert_eq!(sim.stats.n_steps, 1000);

    let abort = sim.abort_flag();
    abort.raise();
    let reason = sim.run().unwrap();
    assert_eq!(reason, StopReason::Aborted);
    assert_eq!(sim.stats.n_steps, 1000, "no step may run after a graceful abort request");

    // The summary stream was flushed and closed at teardown.
    let series = std::fs::read_to_string(&config.output.summary_file).unwrap();
    assert!(series.lines().count() > 1, "summary file is missing its final rows");
    std::fs::remove_file(&config.output.summary_file).ok();
}

#[test]
fn hard_abort_maps_to_the_abort_exit_code() {
    let mut config = quiet_config();
    config.analysis.initial_agents = 5;
    config.analysis.max_agents = 5;
    config.agent_types[0].rates.follow = 0.1;

    let mut sim = Simulation::new(config, 6).unwrap();
    let abort = sim.abort_flag();
    for _ in 0..6 {
        abort.raise();
    }
    let err = sim.run().unwrap_err();
    assert!(matches!(err, SimError::Aborted));
    assert_eq!(err.exit_code(), 130);
}

#[test]
fn capacity_cap_pins_add_rate_but_keeps_other_events() {
    let mut config = quiet_config();
    config.analysis.initial_agents = 4;
    config.analysis.max_agents = 4;
    config.analysis.max_analysis_steps = Some(500);
    config.rates.add.value = 10.0; // would dominate if not pinned
    config.agent_types[0].rates.follow = 0.1;
    config.analysis.follow_model = FollowModel::Random;

    let mut sim = Simulation::new(config, 8).unwrap();
    let reason = sim.run().unwrap();
    assert_eq!(reason, StopReason::StepLimit);
    assert_eq!(sim.network.len(), 4, "population must not exceed the cap");
    assert!(
        sim.stats.n_follows + sim.stats.n_rejected_follows == 500,
        "all steps must have been follow events"
    );
}
