//! Roster construction and the process-level wiring
//!
//! Ordering matters here:
//! 1. arm the controller handlers, so a worker can never signal back into a
//!    default disposition;
//! 2. hold every protocol signal, so each child is born with them blocked
//!    and a command that beats the child's own handlers stays pending;
//! 3. fork the workers;
//! 4. release the mask in the controller and run the schedule.

use crate::config::SchedulerConfig;
use crate::controller::{Controller, ShutdownReport};
use crate::dispatch::{reap, SignalDispatch};
use crate::error::SchedError;
use crate::flags::{Armed, ControllerFlags, WorkerFlags};
use crate::logging::log_with_worker;
use crate::persist::FileCounterStore;
use crate::protocol::{CONTROLLER_SIGNALS, WORKER_SIGNALS};
use crate::suspend::SignalGate;
use crate::worker::{WorkerIdentity, WorkerLoop, EXIT_SETUP_FAILURE};
use nix::unistd::{fork, getpid, getppid, ForkResult, Pid};
use scopeguard::ScopeGuard;
use std::io::{self, Write};
use std::process;

/// Runs a whole schedule: spawn, rotate on request, shut down on request.
///
/// Only the controller returns from here; every forked worker exits inside.
pub fn launch(config: &SchedulerConfig) -> Result<ShutdownReport<Pid>, SchedError> {
    let flags = ControllerFlags::new();
    let armed = flags.arm()?;

    let bootstrap = SignalGate::new(&WORKER_SIGNALS);
    let held = bootstrap.hold()?;
    let roster = spawn_roster(config, armed);
    bootstrap.release(held)?;
    let roster = roster?;

    let controller = Controller::new(
        roster,
        SignalDispatch,
        flags,
        SignalGate::new(&CONTROLLER_SIGNALS),
        config.settle,
    );
    controller.run()
}

/// Forks `config.workers` workers. The caller holds the protocol signals.
///
/// If any fork fails, the workers already started are killed and reaped
/// before the error is returned.
fn spawn_roster(config: &SchedulerConfig, inherited: Armed) -> Result<Vec<Pid>, SchedError> {
    let mut spawned = scopeguard::guard(Vec::with_capacity(config.workers), |pids| {
        reap(&pids);
    });
    let mut inherited = Some(inherited);

    for index in 0..config.workers {
        // SAFETY: the controller is single-threaded, so the child cannot
        // inherit a lock held by another thread.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = run_worker_process(index, config, inherited.take());
                let _ = io::stdout().flush();
                process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => spawned.push(child),
            Err(source) => return Err(SchedError::Startup { index, source }),
        }
    }

    Ok(ScopeGuard::into_inner(spawned))
}

/// Body of a forked worker; returns its exit code.
fn run_worker_process(index: usize, config: &SchedulerConfig, inherited: Option<Armed>) -> i32 {
    // The controller's handlers came along with the fork
    if let Some(armed) = inherited {
        armed.disarm();
    }

    // Handlers go in while the protocol signals are still held
    let flags = WorkerFlags::new();
    let gate = SignalGate::new(&WORKER_SIGNALS);
    let _armed = match flags.arm().and_then(|armed| gate.open().map(|()| armed)) {
        Ok(armed) => armed,
        Err(e) => {
            let _ = log_with_worker(&format!("[{}] {}", e.as_label(), e), Some(index));
            return EXIT_SETUP_FAILURE;
        }
    };

    let identity = WorkerIdentity {
        index,
        pid: getpid().as_raw() as u32,
        parent: getppid().as_raw() as u32,
    };
    let _ = log_with_worker(
        &format!("Worker index {}, PID {}", index, identity.pid),
        Some(index),
    );

    let worker = WorkerLoop::new(
        identity,
        flags,
        gate,
        FileCounterStore::new(&config.output_dir),
        config.work,
    );
    match worker.run() {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            let _ = log_with_worker(&format!("[{}] {}", e.as_label(), e), Some(index));
            EXIT_SETUP_FAILURE
        }
    }
}
