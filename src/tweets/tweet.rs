//! Tweet records

use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, SimTime, TweetId};
use crate::network::agent::{IdeologyId, LanguageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TweetContent {
    Plain,
    Ideological,
    Musical,
    Humorous,
}

/// A live tweet. Retained by the bank until its age bin runs past the
/// observation span, carrying the cached rate pieces the bank needs for
/// lazy rebinning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: TweetId,
    pub tweeter: AgentId,
    pub content: TweetContent,
    pub ideology: IdeologyId,
    pub language: LanguageId,
    pub hashtag: bool,
    pub creation_time: SimTime,
    /// Current age bin in the observation model.
    pub age_bin: usize,
    /// Simulated time at which `age_bin` stops being correct.
    pub next_rebin_time: SimTime,
    /// Transmission-weighted reach over the tweeter's follower tree,
    /// refreshed on every rebin.
    pub base_rate: f64,
}
