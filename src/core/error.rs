use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error at `{key}`: {reason}")]
    Config { key: String, reason: String },

    #[error("capacity exhausted: {0}")]
    Capacity(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("simulation aborted by user")]
    Aborted,
}

impl SimError {
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Config { .. } => 2,
            SimError::Capacity(_) => 3,
            SimError::Io(_) | SimError::Serde(_) | SimError::Snapshot(_) => 4,
            SimError::Invariant(_) => 70,
            SimError::Aborted => 130,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
