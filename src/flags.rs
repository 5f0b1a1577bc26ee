//! Signal-driven flag store
//!
//! Each process owns one flag set: a worker has `resume`, `pause` and
//! `terminate`, the controller has `rotate` and `shutdown`. Handlers only
//! ever store into these atomics; everything else happens in the main loop,
//! which consumes a flag with `test_and_clear`.
//!
//! Flags are level-triggered. Two occurrences of the same signal before the
//! main loop looks collapse into one, exactly as the kernel coalesces a
//! pending signal.

use crate::error::SchedError;
use crate::protocol::{Command, ControlRequest};
use signal_hook::SigId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One word-sized boolean shared between a handler and the main loop
#[derive(Debug, Clone, Default)]
pub struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Async-signal-safe: a single atomic store.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns the prior value and leaves the flag lowered.
    pub fn test_and_clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handler registrations made by `arm`
///
/// Dropping this keeps the handlers installed; call `disarm` to remove them.
#[derive(Debug, Default)]
#[must_use = "handlers stay installed until disarmed"]
pub struct Armed {
    ids: Vec<SigId>,
}

impl Armed {
    /// Removes every handler this set installed.
    pub fn disarm(self) {
        for id in self.ids {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// What one flag check saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub terminate: bool,
    pub resume: bool,
    pub pause: bool,
}

impl Observation {
    /// The command that decides the next phase.
    ///
    /// Terminate dominates. Resume is read before pause, so seeing both
    /// means the pause arrived after the resume was already latched.
    pub fn latest(&self) -> Option<Command> {
        if self.terminate {
            Some(Command::Terminate)
        } else if self.pause {
            Some(Command::Pause)
        } else if self.resume {
            Some(Command::Resume)
        } else {
            None
        }
    }
}

/// Per-worker flag set
#[derive(Debug, Clone, Default)]
pub struct WorkerFlags {
    resume: Flag,
    pause: Flag,
    terminate: Flag,
}

impl WorkerFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches one command. Async-signal-safe.
    ///
    /// Resume and pause retract each other, so the last one raised wins
    /// when both arrive before the main loop looks.
    pub fn raise(&self, command: Command) {
        match command {
            Command::Resume => {
                self.pause.clear();
                self.resume.set();
            }
            Command::Pause => {
                self.resume.clear();
                self.pause.set();
            }
            Command::Terminate => self.terminate.set(),
        }
    }

    /// Whether a terminate is latched, without consuming it.
    pub fn terminate_pending(&self) -> bool {
        self.terminate.is_raised()
    }

    /// Consumes every latched flag. The read order matters, see `Observation::latest`.
    pub fn observe(&self) -> Observation {
        let terminate = self.terminate.test_and_clear();
        let resume = self.resume.test_and_clear();
        let pause = self.pause.test_and_clear();
        Observation {
            terminate,
            resume,
            pause,
        }
    }

    /// Installs the worker handlers (SIGUSR1 resume, SIGUSR2 pause,
    /// SIGINT/SIGTERM terminate).
    pub fn arm(&self) -> Result<Armed, SchedError> {
        let mut armed = Armed::default();
        for command in [Command::Resume, Command::Pause, Command::Terminate] {
            for &signal in command.accepted_signals() {
                let flags = self.clone();
                // SAFETY: the action performs only atomic stores on memory
                // kept alive by the captured Arcs.
                let registered = unsafe {
                    signal_hook::low_level::register(signal as libc::c_int, move || {
                        flags.raise(command)
                    })
                };
                match registered {
                    Ok(id) => armed.ids.push(id),
                    Err(source) => {
                        armed.disarm();
                        return Err(SchedError::HandlerInstall { signal, source });
                    }
                }
            }
        }
        Ok(armed)
    }
}

/// Controller flag set
#[derive(Debug, Clone, Default)]
pub struct ControllerFlags {
    rotate: Flag,
    shutdown: Flag,
}

impl ControllerFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, request: ControlRequest) -> &Flag {
        match request {
            ControlRequest::Rotate => &self.rotate,
            ControlRequest::Shutdown => &self.shutdown,
        }
    }

    /// Latches a request. Async-signal-safe.
    pub fn request(&self, request: ControlRequest) {
        self.flag(request).set();
    }

    /// Consumes the next request. Shutdown is taken before rotate; a
    /// rotate latched alongside it is left behind and never acted on.
    pub fn take_request(&self) -> Option<ControlRequest> {
        if self.shutdown.test_and_clear() {
            Some(ControlRequest::Shutdown)
        } else if self.rotate.test_and_clear() {
            Some(ControlRequest::Rotate)
        } else {
            None
        }
    }

    /// Installs the controller handlers (SIGUSR1 rotates, SIGINT/SIGTERM shut down).
    pub fn arm(&self) -> Result<Armed, SchedError> {
        let mut armed = Armed::default();
        for request in [ControlRequest::Rotate, ControlRequest::Shutdown] {
            for &signal in request.signals() {
                let flag = Arc::clone(&self.flag(request).0);
                match signal_hook::flag::register(signal as libc::c_int, flag) {
                    Ok(id) => armed.ids.push(id),
                    Err(source) => {
                        armed.disarm();
                        return Err(SchedError::HandlerInstall { signal, source });
                    }
                }
            }
        }
        Ok(armed)
    }
}
