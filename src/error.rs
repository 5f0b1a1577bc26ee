//! Error types for the scheduler.
//!
//! - [`SchedError`]: failures of the coordination machinery itself.
//! - [`ConfigError`]: bad tunables in the environment.
//! - [`UsageError`]: bad command line.
//!
//! Delivery loss is not represented here: a command that never reaches
//! its worker is logged by the dispatcher and otherwise ignored.

use nix::sys::signal::Signal;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    /// Process creation failed while building the roster.
    #[error("failed to spawn worker {index}: {source}")]
    Startup { index: usize, source: nix::Error },

    /// Registering an asynchronous handler failed.
    #[error("failed to install handler for {signal}: {source}")]
    HandlerInstall { signal: Signal, source: io::Error },

    /// A worker could not write its final work-unit count.
    #[error("failed to persist work units to {}: {source}", path.display())]
    Persistence { path: PathBuf, source: io::Error },

    /// A command could not be delivered. Logged, never escalated.
    #[error("failed to deliver {signal}: {source}")]
    Delivery { signal: Signal, source: nix::Error },

    /// Changing the signal mask failed.
    #[error("signal mask update failed: {0}")]
    Mask(nix::Error),

    /// Collecting worker exit statuses failed for a reason other than EINTR.
    #[error("collecting worker exits failed: {0}")]
    Collect(nix::Error),
}

impl SchedError {
    /// Short stable label for log lines.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedError::Startup { .. } => "startup_failure",
            SchedError::HandlerInstall { .. } => "handler_install_failure",
            SchedError::Persistence { .. } => "persistence_failure",
            SchedError::Delivery { .. } => "delivery_loss",
            SchedError::Mask(_) => "mask_failure",
            SchedError::Collect(_) => "collect_failure",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("work unit bounds are invalid: min {min} ms, max {max} ms")]
    InvalidWorkBounds { min: u64, max: u64 },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing worker count argument")]
    Missing,

    #[error("unexpected argument: {0}")]
    Unexpected(String),

    #[error("N must be a positive integer, got {0:?}")]
    InvalidCount(String),
}
