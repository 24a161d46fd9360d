//! Directed follow graph over agents

pub mod agent;
pub mod follow_models;
pub mod graph;

pub use agent::{Agents, RetweetBuffer, RetweetRecord};
pub use follow_models::{select_follow_target, FollowModelParams};
pub use graph::{FollowOutcome, Network};
