use chrono::Local;
use once_cell::sync::Lazy;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::worker::WorkerIdentity;

/// Global log file path protected by Mutex
///
/// When None, log lines go to stderr. Stdout carries only progress records.
/// A forked worker inherits the path and appends to the same file.
pub static LOG_FILE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

fn log_file() -> MutexGuard<'static, Option<String>> {
    // A poisoned lock still holds a usable path
    LOG_FILE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Logs a message with timestamp to the configured output
///
/// Must never be called from a signal handler: it allocates and locks.
pub fn log(message: &str) -> io::Result<()> {
    log_with_worker(message, None)
}

/// Logs a message with timestamp and optional worker index
///
/// # Example
/// ```text
/// 2024-05-01 10:00:00 [W2] paused after 14 work units
/// ```
pub fn log_with_worker(message: &str, worker: Option<usize>) -> io::Result<()> {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let log_message = match worker {
        Some(index) => format!("{} [W{}] {}\n", timestamp, index, message),
        None => format!("{} {}\n", timestamp, message),
    };

    match &*log_file() {
        Some(path) => {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(log_message.as_bytes())?;
        }
        None => {
            io::stderr().write_all(log_message.as_bytes())?;
        }
    }

    Ok(())
}

/// Logs a message that ends the process
///
/// If the log cannot be written, the message and the logging error go to
/// stderr instead so the exit is never silent. The logging error is still
/// returned.
pub fn log_fatal(message: &str) -> io::Result<()> {
    log(message).map_err(|e| {
        eprintln!("Error: {}", message);
        eprintln!("Error: could not write log: {}", e);
        e
    })
}

/// Sets the path for the log file
///
/// Subsequent calls to the log functions append to this file.
pub fn set_log_file<P: AsRef<Path>>(path: P) {
    let path_str = path.as_ref().to_string_lossy().into_owned();
    *log_file() = Some(path_str);
}

/// Formats one progress record: `<pid>: <count> | Parent(<parent pid>)`
pub fn progress_line(identity: &WorkerIdentity, count: u64) -> String {
    format!("{}: {} | Parent({})", identity.pid, count, identity.parent)
}

/// Writes one progress record to stdout and flushes it
///
/// Flushing per record keeps lines from different workers whole when
/// stdout is a shared pipe.
pub fn emit_progress(identity: &WorkerIdentity, count: u64) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", progress_line(identity, count))?;
    stdout.flush()
}
