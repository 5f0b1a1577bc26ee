//! Round-robin controller
//!
//! Owns the roster and the active cursor. Only the main loop touches
//! `ControllerState`; the handlers behind [`ControllerFlags`] just latch
//! rotate/shutdown requests.

use crate::dispatch::{CollectError, Dispatch, WorkerExit};
use crate::error::SchedError;
use crate::flags::ControllerFlags;
use crate::logging::log;
use crate::protocol::{Command, ControlRequest};
use crate::suspend::Suspend;
use std::fmt::Write as _;
use std::thread;
use std::time::Duration;

/// One roster entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Worker<H> {
    pub index: usize,
    pub handle: H,
}

#[derive(Debug)]
pub struct ControllerState<H> {
    roster: Vec<Worker<H>>,
    active_cursor: usize,
    shutting_down: bool,
}

impl<H: Copy> ControllerState<H> {
    pub fn new(handles: Vec<H>) -> Self {
        let roster = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| Worker { index, handle })
            .collect();
        Self {
            roster,
            active_cursor: 0,
            shutting_down: false,
        }
    }

    pub fn roster(&self) -> &[Worker<H>] {
        &self.roster
    }

    pub fn active_cursor(&self) -> usize {
        self.active_cursor
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    fn active(&self) -> Option<Worker<H>> {
        self.roster.get(self.active_cursor).copied()
    }

    fn advance(&mut self) -> Option<Worker<H>> {
        if self.roster.is_empty() {
            return None;
        }
        self.active_cursor = (self.active_cursor + 1) % self.roster.len();
        self.active()
    }
}

/// Exit of one worker as collected during shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord<H> {
    pub index: usize,
    pub handle: H,
    /// `None` when the worker vanished without being collected
    pub exit: Option<WorkerExit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport<H> {
    pub workers: Vec<ExitRecord<H>>,
}

impl<H: std::fmt::Display> ShutdownReport<H> {
    pub fn all_succeeded(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.exit.is_some_and(|exit| exit.is_success()))
    }

    pub fn summary(&self) -> String {
        let succeeded = self
            .workers
            .iter()
            .filter(|w| w.exit.is_some_and(|exit| exit.is_success()))
            .count();
        let mut text = format!(
            "{} of {} workers finished cleanly",
            succeeded,
            self.workers.len()
        );
        for w in self.workers.iter().filter(|w| !w.exit.is_some_and(|e| e.is_success())) {
            match w.exit {
                Some(exit) => {
                    let _ = write!(text, "; worker {} (PID {}) {}", w.index, w.handle, exit);
                }
                None => {
                    let _ = write!(text, "; worker {} (PID {}) was never collected", w.index, w.handle);
                }
            }
        }
        text
    }
}

pub struct Controller<D: Dispatch, S: Suspend> {
    state: ControllerState<D::Handle>,
    dispatch: D,
    flags: ControllerFlags,
    suspender: S,
    settle: Duration,
}

impl<D: Dispatch, S: Suspend> Controller<D, S> {
    /// `settle` is how long `run` waits for workers to arm their handlers
    /// before the first activation.
    pub fn new(
        handles: Vec<D::Handle>,
        dispatch: D,
        flags: ControllerFlags,
        suspender: S,
        settle: Duration,
    ) -> Self {
        Self {
            state: ControllerState::new(handles),
            dispatch,
            flags,
            suspender,
            settle,
        }
    }

    pub fn state(&self) -> &ControllerState<D::Handle> {
        &self.state
    }

    fn command(&self, worker: Worker<D::Handle>, command: Command) {
        if let Err(e) = self.dispatch.send(worker.handle, command) {
            let _ = log(&format!(
                "[{}] {} to worker {} (PID {}) lost: {}",
                e.as_label(),
                command,
                worker.index,
                worker.handle,
                e
            ));
        }
    }

    /// Sends the first resume, to worker 0.
    pub fn activate_first(&mut self) {
        if let Some(first) = self.state.roster.first().copied() {
            self.state.active_cursor = 0;
            let _ = log(&format!("Activating worker 0 (PID {})", first.handle));
            self.command(first, Command::Resume);
        }
    }

    /// Pauses the active worker and resumes the next one in roster order.
    pub fn rotate(&mut self) {
        if self.state.shutting_down {
            return;
        }
        let Some(current) = self.state.active() else {
            return;
        };
        self.command(current, Command::Pause);
        if let Some(next) = self.state.advance() {
            let _ = log(&format!(
                "Switching from worker {} to worker {} (PID {})",
                current.index, next.index, next.handle
            ));
            self.command(next, Command::Resume);
        }
    }

    /// Terminates every worker and collects each exit exactly once.
    ///
    /// Returns `Ok(None)` when a shutdown is already under way.
    pub fn shutdown(&mut self) -> Result<Option<ShutdownReport<D::Handle>>, SchedError> {
        if self.state.shutting_down {
            return Ok(None);
        }
        self.state.shutting_down = true;
        let _ = log(&format!(
            "Shutting down, terminating {} workers",
            self.state.roster.len()
        ));

        for &worker in &self.state.roster {
            self.command(worker, Command::Terminate);
        }

        let mut exits: Vec<Option<WorkerExit>> = vec![None; self.state.roster.len()];
        let mut remaining = exits.len();
        while remaining > 0 {
            match self.dispatch.collect() {
                Ok(Some((handle, exit))) => {
                    let slot = self
                        .state
                        .roster
                        .iter()
                        .position(|w| w.handle == handle)
                        .filter(|&index| exits[index].is_none());
                    match slot {
                        Some(index) => {
                            let _ = log(&format!("Worker {} (PID {}) {}", index, handle, exit));
                            exits[index] = Some(exit);
                            remaining -= 1;
                        }
                        None => {
                            let _ = log(&format!("Ignoring exit of unknown child {}", handle));
                        }
                    }
                }
                Ok(None) => {
                    let _ = log(&format!(
                        "No children left to collect, {} workers unaccounted for",
                        remaining
                    ));
                    break;
                }
                Err(CollectError::Interrupted) => continue,
                Err(CollectError::Failed(e)) => return Err(e),
            }
        }

        let workers = self
            .state
            .roster
            .iter()
            .zip(exits)
            .map(|(w, exit)| ExitRecord {
                index: w.index,
                handle: w.handle,
                exit,
            })
            .collect();
        Ok(Some(ShutdownReport { workers }))
    }

    /// Settles, activates worker 0, then serves rotate requests until a
    /// shutdown request completes.
    pub fn run(mut self) -> Result<ShutdownReport<D::Handle>, SchedError> {
        thread::sleep(self.settle);
        self.activate_first();

        loop {
            let flags = &self.flags;
            let mut request = None;
            self.suspender.wait_until(|| {
                request = flags.take_request();
                request.is_some()
            })?;

            match request {
                Some(ControlRequest::Rotate) => self.rotate(),
                Some(ControlRequest::Shutdown) => {
                    if let Some(report) = self.shutdown()? {
                        return Ok(report);
                    }
                }
                None => {}
            }
        }
    }
}
