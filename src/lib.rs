//! Round-Robin Process Scheduler Library
//!
//! One controller process forks N workers and lets exactly one of them do
//! work at a time. All coordination runs over POSIX signals: handlers only
//! latch flags, and each process's main loop turns those flags into
//! transitions.
//!
//! - Worker: SIGUSR1 resume, SIGUSR2 pause, SIGINT (or SIGTERM) terminate
//! - Controller: SIGUSR1 rotate, SIGINT (or SIGTERM) shut down

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod flags;
pub mod logging;
pub mod persist;
pub mod protocol;
pub mod suspend;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export key items for easy use by the binary (main.rs)
pub use bootstrap::launch;
pub use cli::parse_args;
pub use config::SchedulerConfig;
pub use controller::{Controller, ShutdownReport};
pub use error::{ConfigError, SchedError, UsageError};
pub use logging::{log, log_fatal, log_with_worker, set_log_file};

/// Name of the program used in the usage line and log records
pub const PROGRAM_NAME: &str = "rrsched";

/// Current version of the program (from Cargo.toml)
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
