//! Simulation configuration
//!
//! The whole option surface is a serde tree loaded from a JSON document.
//! `SimConfig::validate` rejects inconsistent input with a diagnostic that
//! cites the offending key, so a bad configuration aborts at startup
//! rather than partway through a run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::SimTime;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub analysis: AnalysisConfig,
    pub rates: RatesConfig,
    pub output: OutputConfig,
    pub tweet_observation: TweetObsConfig,
    pub ideologies: Vec<String>,
    pub languages: Vec<String>,
    pub regions: Vec<RegionConfig>,
    pub preference_classes: Vec<PreferenceClassConfig>,
    pub agent_types: Vec<AgentTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Agents created at t = 0, before the event loop starts.
    pub initial_agents: usize,
    /// Hard population bound; the agent arena is preallocated to this size.
    pub max_agents: usize,
    /// Simulated-minute bound, or `"unlimited"`.
    pub max_time: MaxTime,
    /// Optional bound on the number of KMC steps.
    pub max_analysis_steps: Option<u64>,
    /// Optional wall-clock bound, in real minutes.
    pub max_real_time: Option<f64>,
    /// Accepted for compatibility; the interactive hook is an external
    /// collaborator and the core ignores this flag.
    pub enable_interactive_mode: bool,
    pub use_barabasi: bool,
    /// Follow events performed by a freshly created agent when
    /// `use_barabasi` is on.
    pub barabasi_connections: usize,
    /// Exponent applied to degree-bin weights for preferential attachment.
    pub barabasi_exponent: f64,
    /// Draw `dt = -ln(U) / R` instead of the deterministic `1 / R`.
    pub use_random_time_increment: bool,
    pub use_followback: bool,
    /// Route follow-target selection through the recent-retweet buffer.
    pub use_follow_via_retweets: bool,
    pub follow_model: FollowModel,
    /// Sub-model weights for the combined `twitter` follow model, in the
    /// order random, twitter_suggest, agent, preferential_agent, hashtag.
    pub model_weights: Vec<f64>,
    /// Enables the relative ("twice the mean of the follower's followees")
    /// chatty-unfollow policy.
    pub stage1_unfollow: bool,
    /// Absolute chatty threshold in tweets per simulated minute; zero
    /// disables the absolute policy.
    pub unfollow_tweet_rate: f64,
    /// Probability that a tweet carries a hashtag.
    pub use_hashtag_probability: f64,
    /// Steps between full bottom-up rate recomputations that rebaseline
    /// accumulated floating drift.
    pub rate_rebaseline_interval: u64,
}

/// Either a finite simulated-minute bound or the literal `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MaxTime {
    Minutes(SimTime),
    Unlimited(&'static str),
}

impl MaxTime {
    pub fn unlimited() -> Self {
        MaxTime::Unlimited("unlimited")
    }

    pub fn bound(&self) -> SimTime {
        match self {
            MaxTime::Minutes(t) => *t,
            MaxTime::Unlimited(_) => f64::INFINITY,
        }
    }
}

impl<'de> Deserialize<'de> for MaxTime {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Minutes(f64),
            Word(String),
        }
        match Raw::deserialize(de)? {
            Raw::Minutes(t) => Ok(MaxTime::Minutes(t)),
            Raw::Word(w) if w == "unlimited" => Ok(MaxTime::unlimited()),
            Raw::Word(w) => Err(D::Error::custom(format!(
                "max_time must be a number of minutes or \"unlimited\", got \"{w}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowModel {
    Random,
    TwitterSuggest,
    Agent,
    PreferentialAgent,
    Hashtag,
    Twitter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatesConfig {
    pub add: RateFunctionConfig,
}

/// Time-dependent rate description, e.g. `{"function": "linear",
/// "value": 0.1, "slope": 0.01}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateFunctionConfig {
    pub function: RateFunctionKind,
    pub value: f64,
    pub slope: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateFunctionKind {
    #[default]
    Constant,
    Linear,
}

impl Default for RateFunctionConfig {
    fn default() -> Self {
        Self {
            function: RateFunctionKind::Constant,
            value: 0.0,
            slope: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Write the time-series summary file at all.
    pub summary_output: bool,
    pub summary_file: PathBuf,
    /// Echo a summary row to the console at the configured cadence.
    pub stdout_summary: bool,
    /// Binary state snapshot written at teardown when set.
    pub snapshot_file: Option<PathBuf>,
    /// Edge-list dump of the final follow graph when set.
    pub graph_file: Option<PathBuf>,
    /// Per-agent statistics dump when set.
    pub agent_stats_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_output: true,
            summary_file: PathBuf::from("time_series.dat"),
            stdout_summary: false,
            snapshot_file: None,
            graph_file: None,
            agent_stats_file: None,
        }
    }
}

/// Parameters of the tweet-age observation distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TweetObsConfig {
    pub density_function: DensityFunction,
    /// Left edge of the first age bin, minutes.
    pub x_start: f64,
    /// Right edge of the binned domain, minutes.
    pub x_end: f64,
    /// Width of the first bin.
    pub initial_resolution: f64,
    /// Geometric growth factor applied to successive bin widths.
    pub resolution_growth_factor: f64,
    /// Total time a tweet stays live, minutes.
    pub time_span: f64,
}

impl Default for TweetObsConfig {
    fn default() -> Self {
        Self {
            density_function: DensityFunction::PowerLaw {
                amplitude: 1.0,
                exponent: 1.1,
            },
            x_start: 0.1,
            x_end: 480.0,
            initial_resolution: 1.0,
            resolution_growth_factor: 1.05,
            time_span: 480.0,
        }
    }
}

/// Structured observation density `f(x)` over tweet age `x`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DensityFunction {
    /// `a / x^b`
    PowerLaw { amplitude: f64, exponent: f64 },
    /// `a * exp(-k x)`
    Exponential { amplitude: f64, decay: f64 },
    Constant { value: f64 },
}

impl DensityFunction {
    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            DensityFunction::PowerLaw { amplitude, exponent } => amplitude / x.powf(exponent),
            DensityFunction::Exponential { amplitude, decay } => amplitude * (-decay * x).exp(),
            DensityFunction::Constant { value } => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub name: String,
    /// Relative probability that a new agent lands in this region.
    pub add_weight: f64,
    /// Per-region attribute distributions; each indexed like the
    /// corresponding top-level list.
    pub preference_class_weights: Vec<f64>,
    pub ideology_weights: Vec<f64>,
    pub language_weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreferenceClassConfig {
    pub name: String,
    pub tweet_transmission: TransmissionTable,
}

/// Retweet-rate multipliers keyed by tweet-content relation, each row
/// indexed by the tweeter's agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransmissionTable {
    pub plain: Vec<f64>,
    pub same_ideology: Vec<f64>,
    pub different_ideology: Vec<f64>,
    pub humorous: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentTypeConfig {
    pub name: String,
    pub weights: AgentTypeWeights,
    pub followback_probability: f64,
    #[serde(default)]
    pub hashtag_follow_options: HashtagFollowOptions,
    pub rates: AgentTypeRates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentTypeWeights {
    /// Share of newly created agents assigned this type.
    pub add: f64,
    /// Share used when a follow targets "an agent of some type".
    pub follow: f64,
    pub tweet_type: TweetTypeWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TweetTypeWeights {
    pub plain: f64,
    pub ideological: f64,
    pub musical: f64,
    pub humorous: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashtagFollowOptions {
    pub care_about_region: bool,
    pub care_about_ideology: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentTypeRates {
    /// Follow events per agent per simulated minute.
    pub follow: f64,
    /// Tweet events per agent per simulated minute.
    pub tweet: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            initial_agents: 0,
            max_agents: 1000,
            max_time: MaxTime::unlimited(),
            max_analysis_steps: None,
            max_real_time: None,
            enable_interactive_mode: false,
            use_barabasi: false,
            barabasi_connections: 1,
            barabasi_exponent: 1.0,
            use_random_time_increment: true,
            use_followback: false,
            use_follow_via_retweets: false,
            follow_model: FollowModel::Random,
            model_weights: vec![1.0, 1.0, 1.0, 1.0, 1.0],
            stage1_unfollow: false,
            unfollow_tweet_rate: 0.0,
            use_hashtag_probability: 0.0,
            rate_rebaseline_interval: 100_000,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let n_types = 1;
        Self {
            analysis: AnalysisConfig::default(),
            rates: RatesConfig::default(),
            output: OutputConfig::default(),
            tweet_observation: TweetObsConfig::default(),
            ideologies: vec!["Red".into(), "Blue".into()],
            languages: vec!["English".into(), "French".into()],
            regions: vec![RegionConfig {
                name: "Everywhere".into(),
                add_weight: 1.0,
                preference_class_weights: vec![1.0],
                ideology_weights: vec![1.0, 1.0],
                language_weights: vec![1.0, 1.0],
            }],
            preference_classes: vec![PreferenceClassConfig {
                name: "StandardPref".into(),
                tweet_transmission: TransmissionTable {
                    plain: vec![1.0; n_types],
                    same_ideology: vec![1.0; n_types],
                    different_ideology: vec![1.0; n_types],
                    humorous: vec![1.0; n_types],
                },
            }],
            agent_types: vec![AgentTypeConfig {
                name: "Standard".into(),
                weights: AgentTypeWeights {
                    add: 1.0,
                    follow: 1.0,
                    tweet_type: TweetTypeWeights {
                        plain: 0.6,
                        ideological: 0.2,
                        musical: 0.1,
                        humorous: 0.1,
                    },
                },
                followback_probability: 0.0,
                hashtag_follow_options: HashtagFollowOptions::default(),
                rates: AgentTypeRates {
                    follow: 0.01,
                    tweet: 0.01,
                },
            }],
        }
    }
}

fn check_weights(key: &str, weights: &[f64], expected_len: usize) -> Result<()> {
    if weights.len() != expected_len {
        return Err(SimError::config(
            key,
            format!("expected {expected_len} entries, got {}", weights.len()),
        ));
    }
    if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
        return Err(SimError::config(key, "weights must be finite and non-negative"));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(SimError::config(key, "weights must not all be zero"));
    }
    Ok(())
}

fn check_probability(key: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::config(key, format!("probability {p} outside [0, 1]")));
    }
    Ok(())
}

impl SimConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text).map_err(|e| {
            SimError::config(path.display().to_string(), e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Stable digest of the configuration, stored in snapshots so a reload
    /// against a different configuration is caught.
    pub fn digest(&self) -> u64 {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        hasher.finish()
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if self.agent_types.is_empty() {
            return Err(SimError::config("agent_types", "at least one agent type is required"));
        }
        if self.regions.is_empty() {
            return Err(SimError::config("regions", "at least one region is required"));
        }
        if self.languages.is_empty() {
            return Err(SimError::config("languages", "at least one language is required"));
        }
        if self.ideologies.is_empty() {
            return Err(SimError::config("ideologies", "at least one ideology is required"));
        }
        if self.preference_classes.is_empty() {
            return Err(SimError::config(
                "preference_classes",
                "at least one preference class is required",
            ));
        }
        if a.max_agents == 0 {
            return Err(SimError::config("analysis.max_agents", "must be positive"));
        }
        if a.initial_agents > a.max_agents {
            return Err(SimError::config(
                "analysis.initial_agents",
                format!(
                    "initial_agents ({}) exceeds max_agents ({})",
                    a.initial_agents, a.max_agents
                ),
            ));
        }
        if a.max_time.bound() < 0.0 {
            return Err(SimError::config("analysis.max_time", "must be non-negative"));
        }
        check_weights("analysis.model_weights", &a.model_weights, 5)?;
        check_probability("analysis.use_hashtag_probability", a.use_hashtag_probability)?;
        if a.unfollow_tweet_rate < 0.0 {
            return Err(SimError::config("analysis.unfollow_tweet_rate", "must be non-negative"));
        }
        if a.barabasi_exponent < 0.0 {
            return Err(SimError::config("analysis.barabasi_exponent", "must be non-negative"));
        }

        if self.rates.add.value < 0.0 {
            return Err(SimError::config("rates.add.value", "must be non-negative"));
        }

        let obs = &self.tweet_observation;
        if obs.x_start <= 0.0 {
            return Err(SimError::config("tweet_observation.x_start", "must be positive"));
        }
        if obs.x_end <= obs.x_start {
            return Err(SimError::config("tweet_observation.x_end", "must exceed x_start"));
        }
        if obs.initial_resolution <= 0.0 {
            return Err(SimError::config(
                "tweet_observation.initial_resolution",
                "must be positive",
            ));
        }
        if obs.resolution_growth_factor < 1.0 {
            return Err(SimError::config(
                "tweet_observation.resolution_growth_factor",
                "must be at least 1.0",
            ));
        }
        if obs.time_span <= 0.0 {
            return Err(SimError::config("tweet_observation.time_span", "must be positive"));
        }

        let n_types = self.agent_types.len();
        let add_sum: f64 = self.agent_types.iter().map(|t| t.weights.add).sum();
        if add_sum <= 0.0 {
            return Err(SimError::config("agent_types[].weights.add", "must not all be zero"));
        }
        for ty in &self.agent_types {
            let key = format!("agent_types[{}]", ty.name);
            check_probability(&format!("{key}.followback_probability"), ty.followback_probability)?;
            if ty.rates.follow < 0.0 || ty.rates.tweet < 0.0 {
                return Err(SimError::config(format!("{key}.rates"), "must be non-negative"));
            }
            let tw = &ty.weights.tweet_type;
            check_weights(
                &format!("{key}.weights.tweet_type"),
                &[tw.plain, tw.ideological, tw.musical, tw.humorous],
                4,
            )?;
        }

        for region in &self.regions {
            let key = format!("regions[{}]", region.name);
            if region.add_weight < 0.0 {
                return Err(SimError::config(format!("{key}.add_weight"), "must be non-negative"));
            }
            check_weights(
                &format!("{key}.preference_class_weights"),
                &region.preference_class_weights,
                self.preference_classes.len(),
            )?;
            check_weights(
                &format!("{key}.ideology_weights"),
                &region.ideology_weights,
                self.ideologies.len(),
            )?;
            check_weights(
                &format!("{key}.language_weights"),
                &region.language_weights,
                self.languages.len(),
            )?;
        }
        if self.regions.iter().map(|r| r.add_weight).sum::<f64>() <= 0.0 {
            return Err(SimError::config("regions[].add_weight", "must not all be zero"));
        }

        for pref in &self.preference_classes {
            let key = format!("preference_classes[{}].tweet_transmission", pref.name);
            let table = &pref.tweet_transmission;
            for (row_name, row) in [
                ("plain", &table.plain),
                ("same_ideology", &table.same_ideology),
                ("different_ideology", &table.different_ideology),
                ("humorous", &table.humorous),
            ] {
                if row.len() != n_types {
                    return Err(SimError::config(
                        format!("{key}.{row_name}"),
                        format!("expected one entry per agent type ({n_types}), got {}", row.len()),
                    ));
                }
                if row.iter().any(|r| *r < 0.0 || !r.is_finite()) {
                    return Err(SimError::config(
                        format!("{key}.{row_name}"),
                        "rates must be finite and non-negative",
                    ));
                }
            }
        }
        Ok(())
    }
}
