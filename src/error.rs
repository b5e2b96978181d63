#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use thiserror::Error;

/// Failures surfaced by the load engine and the request validators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Caller supplied an out-of-range or inconsistent value. Raised before any side effect.
    #[error("{0}")]
    Validation(String),

    /// The worker executable is missing or the OS refused to spawn it.
    #[error("worker launch failed: {0}")]
    WorkerLaunch(String),

    /// Some workers could not be terminated; `failed` holds the pids still tracked.
    #[error("worker termination failed for pids {failed:?}: {reason}")]
    Termination { failed: Vec<u32>, reason: String },

    /// The task running a coordinator operation panicked or was aborted.
    #[error("load operation did not complete: {0}")]
    Interrupted(String),
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Validation failures are the caller's fault, everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
