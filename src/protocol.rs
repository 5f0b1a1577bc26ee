//! Occurrence kinds exchanged between controller and workers, and the
//! OS signal carrying each one.

use nix::sys::signal::Signal;
use std::fmt;

/// Commands the controller sends to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Resume,
    Pause,
    Terminate,
}

impl Command {
    /// Signal the controller sends for this command
    pub fn signal(self) -> Signal {
        match self {
            Command::Resume => Signal::SIGUSR1,
            Command::Pause => Signal::SIGUSR2,
            Command::Terminate => Signal::SIGINT,
        }
    }

    /// Signals a worker treats as this command. Terminate also answers
    /// SIGTERM so a worker stopped from outside still persists its count.
    pub fn accepted_signals(self) -> &'static [Signal] {
        match self {
            Command::Resume => &[Signal::SIGUSR1],
            Command::Pause => &[Signal::SIGUSR2],
            Command::Terminate => &[Signal::SIGINT, Signal::SIGTERM],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Resume => "resume",
            Command::Pause => "pause",
            Command::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Requests an operator sends to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRequest {
    Rotate,
    Shutdown,
}

impl ControlRequest {
    /// Signals that raise this request. Shutdown also answers SIGTERM.
    pub fn signals(self) -> &'static [Signal] {
        match self {
            ControlRequest::Rotate => &[Signal::SIGUSR1],
            ControlRequest::Shutdown => &[Signal::SIGINT, Signal::SIGTERM],
        }
    }
}

/// Every signal the worker protocol listens on
pub const WORKER_SIGNALS: [Signal; 4] = [
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGINT,
    Signal::SIGTERM,
];

/// Every signal the controller protocol listens on
pub const CONTROLLER_SIGNALS: [Signal; 3] = [Signal::SIGUSR1, Signal::SIGINT, Signal::SIGTERM];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_commands_use_distinct_signals() {
        let resume = Command::Resume.signal();
        let pause = Command::Pause.signal();
        let terminate = Command::Terminate.signal();
        assert_ne!(resume, pause);
        assert_ne!(pause, terminate);
        assert_ne!(resume, terminate);
        for command in [Command::Resume, Command::Pause, Command::Terminate] {
            assert!(command.accepted_signals().contains(&command.signal()));
            for signal in command.accepted_signals() {
                assert!(WORKER_SIGNALS.contains(signal));
            }
        }
    }

    #[test]
    fn test_controller_signals_are_a_subset_of_worker_signals() {
        // The bootstrap mask is built from the worker set
        for signal in CONTROLLER_SIGNALS {
            assert!(WORKER_SIGNALS.contains(&signal));
        }
    }

    #[test]
    fn test_controller_requests_are_covered() {
        for request in [ControlRequest::Rotate, ControlRequest::Shutdown] {
            for signal in request.signals() {
                assert!(CONTROLLER_SIGNALS.contains(signal));
            }
        }
        assert!(!ControlRequest::Rotate
            .signals()
            .iter()
            .any(|s| ControlRequest::Shutdown.signals().contains(s)));
    }
}
