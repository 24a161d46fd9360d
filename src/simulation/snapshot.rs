//! Binary state snapshots
//!
//! A snapshot is self-describing: a format tag, the configuration digest,
//! and the primary state (agent columns, live tweets, RNG, statistics).
//! Derived structures — follower trees, rank trees, event trees — are
//! rebuilt on load. Reload refuses a digest mismatch unless explicitly
//! overridden.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::rng::SimRng;
use crate::core::types::SimTime;
use crate::network::agent::Agents;
use crate::simulation::kmc::SimStats;
use crate::tweets::tweet::Tweet;

const SNAPSHOT_TAG: &[u8; 8] = b"CHIRPSN1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub config_digest: u64,
    pub time: SimTime,
    pub current_month: u32,
    pub stats: SimStats,
    pub rng: SimRng,
    pub agents: Agents,
    pub tweets: Vec<Tweet>,
    pub milestone_populations: Vec<usize>,
}

pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let body = bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| SimError::Snapshot(e.to_string()))?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_TAG.len() + body.len());
    bytes.extend_from_slice(SNAPSHOT_TAG);
    bytes.extend_from_slice(&body);
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load(path: &Path, expected_digest: u64, allow_mismatch: bool) -> Result<Snapshot> {
    let bytes = fs::read(path)?;
    let Some(body) = bytes.strip_prefix(SNAPSHOT_TAG) else {
        return Err(SimError::Snapshot(format!(
            "{} is not a chirpnet snapshot",
            path.display()
        )));
    };
    let (snapshot, _): (Snapshot, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| SimError::Snapshot(e.to_string()))?;
    if snapshot.config_digest != expected_digest && !allow_mismatch {
        return Err(SimError::Snapshot(format!(
            "snapshot was taken under a different configuration \
             (digest {:#x}, expected {:#x}); pass the override flag to load anyway",
            snapshot.config_digest, expected_digest
        )));
    }
    Ok(snapshot)
}
