//! Worker state machine and control loop
//!
//! `AwaitingStart -> Active <-> Paused -> Terminating -> Exited`
//!
//! Handlers only latch flags. Every transition, including the final write of
//! the work-unit count, happens here in ordinary control flow at the next
//! flag check, never inside a handler.

use crate::error::SchedError;
use crate::flags::{Observation, WorkerFlags};
use crate::logging::{emit_progress, log_with_worker};
use crate::persist::CounterStore;
use crate::protocol::Command;
use crate::suspend::Suspend;
use rand::Rng;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code after the count was persisted
pub const EXIT_OK: i32 = 0;
/// Exit code when the worker could not set itself up
pub const EXIT_SETUP_FAILURE: i32 = 1;
/// Exit code when the final count could not be written
pub const EXIT_PERSISTENCE_FAILURE: i32 = 2;

/// Who a worker is, as seen from inside its own process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    /// Position in the controller's roster
    pub index: usize,
    /// Own process id; names the persisted file
    pub pid: u32,
    /// Controller's process id
    pub parent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingStart,
    Active,
    Paused,
    Terminating,
    Exited,
}

impl Phase {
    /// Phases that block in the suspend primitive
    pub fn is_waiting(self) -> bool {
        matches!(self, Phase::AwaitingStart | Phase::Paused)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::AwaitingStart => "awaiting start",
            Phase::Active => "active",
            Phase::Paused => "paused",
            Phase::Terminating => "terminating",
            Phase::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Pure transition logic, no I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerState {
    phase: Phase,
    work_units_completed: u64,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingStart,
            work_units_completed: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn work_units_completed(&self) -> u64 {
        self.work_units_completed
    }

    /// Applies one flag check and returns the resulting phase.
    ///
    /// Once `Terminating` or `Exited`, nothing moves the worker back.
    pub fn apply(&mut self, seen: Observation) -> Phase {
        let next = match (self.phase, seen.latest()) {
            (Phase::Terminating | Phase::Exited, _) => self.phase,
            (_, Some(Command::Terminate)) => Phase::Terminating,
            (Phase::Active, Some(Command::Pause)) => Phase::Paused,
            (Phase::AwaitingStart | Phase::Paused, Some(Command::Resume)) => Phase::Active,
            (phase, _) => phase,
        };
        self.phase = next;
        next
    }

    /// Counts a finished unit. Units only count while active.
    pub fn complete_unit(&mut self) -> u64 {
        if self.phase == Phase::Active {
            self.work_units_completed += 1;
        }
        self.work_units_completed
    }

    /// Marks the count as handled; the worker is done.
    pub fn finish(&mut self) {
        self.phase = Phase::Exited;
    }
}

/// Bounds for one simulated unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnits {
    pub min: Duration,
    pub max: Duration,
}

impl Default for WorkUnits {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(200),
        }
    }
}

impl WorkUnits {
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// How a worker ended
#[derive(Debug)]
pub struct WorkerOutcome {
    pub work_units: u64,
    pub persisted: Result<PathBuf, SchedError>,
}

impl WorkerOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.persisted {
            Ok(_) => EXIT_OK,
            Err(_) => EXIT_PERSISTENCE_FAILURE,
        }
    }
}

/// The per-worker control loop
pub struct WorkerLoop<S: Suspend, C: CounterStore> {
    identity: WorkerIdentity,
    flags: WorkerFlags,
    state: WorkerState,
    suspender: S,
    store: C,
    work: WorkUnits,
}

impl<S: Suspend, C: CounterStore> WorkerLoop<S, C> {
    pub fn new(
        identity: WorkerIdentity,
        flags: WorkerFlags,
        suspender: S,
        store: C,
        work: WorkUnits,
    ) -> Self {
        Self {
            identity,
            flags,
            state: WorkerState::new(),
            suspender,
            store,
            work,
        }
    }

    fn log(&self, message: &str) {
        let _ = log_with_worker(message, Some(self.identity.index));
    }

    fn check(&mut self) -> Phase {
        let before = self.state.phase();
        let after = self.state.apply(self.flags.observe());
        if before != after {
            self.log(&format!(
                "{} -> {} after {} work units",
                before,
                after,
                self.state.work_units_completed()
            ));
        }
        after
    }

    /// Blocks until a resume or terminate moves the worker out of waiting.
    fn await_command(&mut self) -> Result<(), SchedError> {
        let flags = &self.flags;
        let state = &mut self.state;
        let index = self.identity.index;
        self.suspender.wait_until(|| {
            let before = state.phase();
            let after = state.apply(flags.observe());
            if before != after {
                let _ = log_with_worker(&format!("{} -> {}", before, after), Some(index));
            }
            !after.is_waiting()
        })
    }

    fn perform_unit(&mut self) {
        let duration = self.work.pick(&mut rand::thread_rng());
        std::thread::sleep(duration);
        // A terminate during the unit cancels it; the next check acts on it
        if self.flags.terminate_pending() {
            self.log("Terminate arrived mid-unit, unit not counted");
            return;
        }
        let count = self.state.complete_unit();
        if let Err(e) = emit_progress(&self.identity, count) {
            self.log(&format!("Failed to emit progress record: {}", e));
        }
    }

    /// Runs until terminated. Setup errors from the suspend primitive are
    /// returned; a failed final write is reported in the outcome instead.
    pub fn run(mut self) -> Result<WorkerOutcome, SchedError> {
        loop {
            match self.state.phase() {
                Phase::AwaitingStart | Phase::Paused => self.await_command()?,
                Phase::Active => {
                    if self.check() == Phase::Active {
                        self.perform_unit();
                    }
                }
                Phase::Terminating | Phase::Exited => {
                    let work_units = self.state.work_units_completed();
                    let persisted = self.store.persist(&self.identity, work_units);
                    match &persisted {
                        Ok(path) => self.log(&format!(
                            "Persisted {} work units to {}",
                            work_units,
                            path.display()
                        )),
                        Err(e) => self.log(&format!("[{}] {}", e.as_label(), e)),
                    }
                    self.state.finish();
                    return Ok(WorkerOutcome {
                        work_units,
                        persisted,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::FileCounterStore;
    use crate::suspend::testing::PollingSuspend;
    use std::fs;
    use std::thread;
    use tempfile::tempdir;

    fn seen(command: Command) -> Observation {
        let flags = WorkerFlags::new();
        flags.raise(command);
        flags.observe()
    }

    #[test]
    fn test_resume_starts_and_pause_parks() {
        let mut state = WorkerState::new();
        assert_eq!(state.apply(Observation::default()), Phase::AwaitingStart);
        assert_eq!(state.apply(seen(Command::Resume)), Phase::Active);
        assert_eq!(state.apply(seen(Command::Resume)), Phase::Active);
        assert_eq!(state.apply(seen(Command::Pause)), Phase::Paused);
        assert_eq!(state.apply(seen(Command::Pause)), Phase::Paused);
        assert_eq!(state.apply(seen(Command::Resume)), Phase::Active);
    }

    #[test]
    fn test_pause_before_start_keeps_waiting() {
        let mut state = WorkerState::new();
        assert_eq!(state.apply(seen(Command::Pause)), Phase::AwaitingStart);
    }

    #[test]
    fn test_terminate_wins_over_resume() {
        let flags = WorkerFlags::new();
        let mut state = WorkerState::new();
        flags.raise(Command::Terminate);
        flags.raise(Command::Resume);

        assert_eq!(state.apply(flags.observe()), Phase::Terminating);
        // Nothing brings a terminating worker back
        assert_eq!(state.apply(seen(Command::Resume)), Phase::Terminating);
        state.finish();
        assert_eq!(state.apply(seen(Command::Resume)), Phase::Exited);
    }

    #[test]
    fn test_units_only_count_while_active() {
        let mut state = WorkerState::new();
        assert_eq!(state.complete_unit(), 0);
        state.apply(seen(Command::Resume));
        assert_eq!(state.complete_unit(), 1);
        assert_eq!(state.complete_unit(), 2);
        state.apply(seen(Command::Pause));
        assert_eq!(state.complete_unit(), 2);
    }

    #[test]
    fn test_work_unit_duration_in_bounds() {
        let work = WorkUnits::default();
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let d = work.pick(&mut rng);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
        let fixed = WorkUnits {
            min: Duration::from_millis(5),
            max: Duration::from_millis(5),
        };
        assert_eq!(fixed.pick(&mut rng), Duration::from_millis(5));
    }

    fn quick_loop(
        flags: &WorkerFlags,
        dir: &std::path::Path,
    ) -> WorkerLoop<PollingSuspend, FileCounterStore> {
        let identity = WorkerIdentity {
            index: 0,
            pid: 5000,
            parent: 1,
        };
        let work = WorkUnits {
            min: Duration::from_millis(1),
            max: Duration::from_millis(2),
        };
        WorkerLoop::new(
            identity,
            flags.clone(),
            PollingSuspend::default(),
            FileCounterStore::new(dir),
            work,
        )
    }

    #[test]
    fn test_terminate_while_awaiting_start_persists_zero() {
        let dir = tempdir().unwrap();
        let flags = WorkerFlags::new();
        flags.raise(Command::Terminate);

        let outcome = quick_loop(&flags, dir.path()).run().unwrap();

        assert_eq!(outcome.work_units, 0);
        assert_eq!(outcome.exit_code(), EXIT_OK);
        assert_eq!(fs::read_to_string(dir.path().join("5000.txt")).unwrap(), "0\n");
    }

    #[test]
    fn test_active_worker_counts_then_persists() {
        let dir = tempdir().unwrap();
        let flags = WorkerFlags::new();
        let worker = quick_loop(&flags, dir.path());
        let handle = thread::spawn(move || worker.run());

        flags.raise(Command::Resume);
        thread::sleep(Duration::from_millis(40));
        flags.raise(Command::Pause);
        thread::sleep(Duration::from_millis(10));
        flags.raise(Command::Terminate);

        let outcome = handle.join().unwrap().unwrap();
        assert!(outcome.work_units > 0);
        let written = fs::read_to_string(dir.path().join("5000.txt")).unwrap();
        assert_eq!(written, format!("{}\n", outcome.work_units));
    }

    #[test]
    fn test_terminate_during_unit_is_not_counted() {
        let dir = tempdir().unwrap();
        let flags = WorkerFlags::new();
        let identity = WorkerIdentity {
            index: 0,
            pid: 5001,
            parent: 1,
        };
        let work = WorkUnits {
            min: Duration::from_millis(300),
            max: Duration::from_millis(300),
        };
        let worker = WorkerLoop::new(
            identity,
            flags.clone(),
            PollingSuspend::default(),
            FileCounterStore::new(dir.path()),
            work,
        );
        let handle = thread::spawn(move || worker.run());

        flags.raise(Command::Resume);
        // Well inside the first unit
        thread::sleep(Duration::from_millis(100));
        flags.raise(Command::Terminate);

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.work_units, 0);
        assert_eq!(fs::read_to_string(dir.path().join("5001.txt")).unwrap(), "0\n");
    }

    #[test]
    fn test_persistence_failure_still_exits() {
        let dir = tempdir().unwrap();
        let flags = WorkerFlags::new();
        flags.raise(Command::Terminate);

        let outcome = quick_loop(&flags, &dir.path().join("missing")).run().unwrap();

        assert!(outcome.persisted.is_err());
        assert_eq!(outcome.exit_code(), EXIT_PERSISTENCE_FAILURE);
    }
}
