//! Delivery of commands to workers and collection of their exits
//!
//! [`Dispatch`] is the seam between the scheduling protocol and the process
//! primitives. [`SignalDispatch`] is the OS implementation: `kill` to send,
//! `wait` to collect.

use crate::error::SchedError;
use crate::logging::log;
use crate::protocol::Command;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::Pid;
use std::fmt;

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(i32),
    Signaled(Signal),
}

impl WorkerExit {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerExit::Exited(0))
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited(code) => write!(f, "exited with status {}", code),
            WorkerExit::Signaled(signal) => write!(f, "killed by {}", signal),
        }
    }
}

/// Why `collect` returned without an exit
#[derive(Debug)]
pub enum CollectError {
    /// The wait was interrupted; call again.
    Interrupted,
    Failed(SchedError),
}

pub trait Dispatch {
    type Handle: Copy + Eq + fmt::Display;

    /// Fire-and-forget. Failure means the occurrence is lost; callers log it
    /// and carry on.
    fn send(&self, handle: Self::Handle, command: Command) -> Result<(), SchedError>;

    /// Blocks for the next exited worker; `Ok(None)` once none are left.
    fn collect(&mut self) -> Result<Option<(Self::Handle, WorkerExit)>, CollectError>;
}

/// Real processes, real signals
#[derive(Debug, Default)]
pub struct SignalDispatch;

impl Dispatch for SignalDispatch {
    type Handle = Pid;

    fn send(&self, handle: Pid, command: Command) -> Result<(), SchedError> {
        let signal = command.signal();
        kill(handle, signal).map_err(|source| SchedError::Delivery { signal, source })
    }

    fn collect(&mut self) -> Result<Option<(Pid, WorkerExit)>, CollectError> {
        match wait() {
            Ok(WaitStatus::Exited(pid, code)) => Ok(Some((pid, WorkerExit::Exited(code)))),
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                Ok(Some((pid, WorkerExit::Signaled(signal))))
            }
            // Stops and continues are not exits
            Ok(_) => Err(CollectError::Interrupted),
            Err(Errno::EINTR) => Err(CollectError::Interrupted),
            Err(Errno::ECHILD) => Ok(None),
            Err(e) => Err(CollectError::Failed(SchedError::Collect(e))),
        }
    }
}

/// Kills and reaps every pid; used when the roster cannot be completed
pub fn reap(pids: &[Pid]) {
    for &pid in pids {
        if let Err(e) = kill(pid, Signal::SIGKILL) {
            let _ = log(&format!("Failed to kill worker PID {}: {}", pid, e));
        }
    }
    for &pid in pids {
        loop {
            match nix::sys::wait::waitpid(pid, None) {
                Err(Errno::EINTR) => continue,
                Ok(status) => {
                    let _ = log(&format!("Reaped worker PID {}: {:?}", pid, status));
                    break;
                }
                Err(e) => {
                    let _ = log(&format!("Failed to reap worker PID {}: {}", pid, e));
                    break;
                }
            }
        }
    }
}
