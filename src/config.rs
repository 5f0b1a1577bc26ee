use crate::error::ConfigError;
use crate::worker::WorkUnits;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Directory receiving `<pid>.txt` files (default: current directory)
pub const ENV_OUTPUT_DIR: &str = "RRSCHED_OUTPUT_DIR";
/// Delay in ms before worker 0 is activated (default: 1000)
pub const ENV_SETTLE_MS: &str = "RRSCHED_SETTLE_MS";
/// Shortest work unit in ms (default: 100)
pub const ENV_WORK_MIN_MS: &str = "RRSCHED_WORK_MIN_MS";
/// Longest work unit in ms (default: 200)
pub const ENV_WORK_MAX_MS: &str = "RRSCHED_WORK_MAX_MS";
/// Log file path; stderr when unset
pub const ENV_LOG_FILE: &str = "RRSCHED_LOG_FILE";

/// Everything one scheduler run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of workers (N)
    pub workers: usize,
    pub output_dir: PathBuf,
    pub settle: Duration,
    pub work: WorkUnits,
    pub log_file: Option<PathBuf>,
}

impl SchedulerConfig {
    /// Defaults for `workers`, without reading the environment
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            output_dir: PathBuf::from("."),
            settle: Duration::from_millis(1000),
            work: WorkUnits::default(),
            log_file: None,
        }
    }

    /// Defaults overridden by `RRSCHED_*` environment variables
    ///
    /// # Errors
    /// - A numeric variable that does not parse as a non-negative integer
    /// - Work unit bounds with min above max, or a zero max
    pub fn from_env(workers: usize) -> Result<Self, ConfigError> {
        let mut config = Self::new(workers);

        if let Some(dir) = env::var_os(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = env::var_os(ENV_LOG_FILE) {
            config.log_file = Some(PathBuf::from(path));
        }
        if let Some(ms) = millis_from_env(ENV_SETTLE_MS)? {
            config.settle = Duration::from_millis(ms);
        }

        let min = millis_from_env(ENV_WORK_MIN_MS)?.map(Duration::from_millis);
        let max = millis_from_env(ENV_WORK_MAX_MS)?.map(Duration::from_millis);
        config.work = WorkUnits {
            min: min.unwrap_or(config.work.min),
            max: max.unwrap_or(config.work.max),
        };
        if config.work.min > config.work.max || config.work.max.is_zero() {
            return Err(ConfigError::InvalidWorkBounds {
                min: config.work.min.as_millis() as u64,
                max: config.work.max.as_millis() as u64,
            });
        }

        Ok(config)
    }
}

fn millis_from_env(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(raw)) => Err(ConfigError::InvalidNumber {
            var,
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}
