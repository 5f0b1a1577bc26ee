//! In-process stand-ins for the process and signal collaborators
//!
//! Workers run as threads around real `WorkerLoop`s. "Sending a signal"
//! raises the target's `WorkerFlags` exactly as its handler would, so
//! coalescing and last-write-wins behave as they do across processes.

use crate::dispatch::{CollectError, Dispatch, WorkerExit};
use crate::error::SchedError;
use crate::flags::WorkerFlags;
use crate::persist::FileCounterStore;
use crate::protocol::Command;
use crate::suspend::testing::PollingSuspend;
use crate::worker::{WorkUnits, WorkerIdentity, WorkerLoop, EXIT_SETUP_FAILURE};
use nix::errno::Errno;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Fake pid of thread worker `i` is `TEST_PID_BASE + i`
pub const TEST_PID_BASE: u32 = 7000;

/// Records every command and replays scripted collection results
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    sent: RefCell<Vec<(usize, Command)>>,
    script: VecDeque<Result<Option<(usize, WorkerExit)>, CollectError>>,
}

impl RecordingDispatch {
    pub fn sent(&self) -> Vec<(usize, Command)> {
        self.sent.borrow().clone()
    }

    pub fn push_exit(&mut self, handle: usize, exit: WorkerExit) {
        self.script.push_back(Ok(Some((handle, exit))));
    }

    pub fn push_interrupted(&mut self) {
        self.script.push_back(Err(CollectError::Interrupted));
    }

    pub fn script_exits_for(&mut self, handles: impl IntoIterator<Item = usize>) {
        for handle in handles {
            self.push_exit(handle, WorkerExit::Exited(0));
        }
    }
}

impl Dispatch for RecordingDispatch {
    type Handle = usize;

    fn send(&self, handle: usize, command: Command) -> Result<(), SchedError> {
        self.sent.borrow_mut().push((handle, command));
        Ok(())
    }

    fn collect(&mut self) -> Result<Option<(usize, WorkerExit)>, CollectError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

/// Delivers commands to thread workers through their flags
pub struct ThreadDispatch {
    flags: Vec<WorkerFlags>,
    exits: Receiver<(usize, WorkerExit)>,
}

impl Dispatch for ThreadDispatch {
    type Handle = usize;

    fn send(&self, handle: usize, command: Command) -> Result<(), SchedError> {
        match self.flags.get(handle) {
            Some(flags) => {
                flags.raise(command);
                Ok(())
            }
            None => Err(SchedError::Delivery {
                signal: command.signal(),
                source: Errno::ESRCH,
            }),
        }
    }

    fn collect(&mut self) -> Result<Option<(usize, WorkerExit)>, CollectError> {
        // Every sender gone means every worker has reported
        Ok(self.exits.recv().ok())
    }
}

/// Starts `n` thread workers persisting into `dir`, with 1-2 ms work units.
pub fn spawn_thread_workers(n: usize, dir: &Path) -> (ThreadDispatch, Vec<usize>) {
    let (tx, rx) = mpsc::channel();
    let mut flags = Vec::with_capacity(n);
    for index in 0..n {
        let worker_flags = WorkerFlags::new();
        flags.push(worker_flags.clone());
        let identity = WorkerIdentity {
            index,
            pid: TEST_PID_BASE + index as u32,
            parent: TEST_PID_BASE - 1,
        };
        let work = WorkUnits {
            min: Duration::from_millis(1),
            max: Duration::from_millis(2),
        };
        let worker = WorkerLoop::new(
            identity,
            worker_flags,
            PollingSuspend::default(),
            FileCounterStore::new(dir),
            work,
        );
        let tx = tx.clone();
        thread::spawn(move || {
            let exit = match worker.run() {
                Ok(outcome) => WorkerExit::Exited(outcome.exit_code()),
                Err(_) => WorkerExit::Exited(EXIT_SETUP_FAILURE),
            };
            let _ = tx.send((index, exit));
        });
    }
    (ThreadDispatch { flags, exits: rx }, (0..n).collect())
}
