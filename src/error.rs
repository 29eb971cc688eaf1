use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchFlowError>;

#[derive(Debug, Error)]
pub enum ArchFlowError {
    #[error("invalid spec for server `{server}`: {reason}")]
    SpecInvalid { server: String, reason: String },
    #[error("no spec found for server `{0}`")]
    SpecNotFound(String),
    #[error(
        "no client available for `{server_set}` after {waited:?} (capacity: {capacity}, in use: {in_use})"
    )]
    PoolExhausted {
        server_set: String,
        waited: Duration,
        capacity: usize,
        in_use: usize,
    },
    #[error("step `{step}` failed: {message}")]
    StepFailed { step: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("context error: {0}")]
    Context(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArchFlowError {
    /// Errors in this class mean the borrowed handle may be left in a
    /// corrupted state and must not be handed to a future borrower.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
