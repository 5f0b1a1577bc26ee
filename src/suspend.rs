//! Blocking "sleep until interrupted" primitive
//!
//! The naive `while !flag { pause() }` loses a wake-up when the signal lands
//! between the flag check and `pause`. [`SignalGate`] closes that window by
//! checking with the protocol signals blocked and sleeping in `sigsuspend`,
//! which unblocks them and sleeps in one step.

use crate::error::SchedError;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};

/// Something that can block the caller until a flag may have changed
pub trait Suspend {
    /// Evaluates `ready` until it returns true, blocking between checks.
    ///
    /// Implementations may wake spuriously; `ready` is always re-checked.
    fn wait_until<F>(&self, ready: F) -> Result<(), SchedError>
    where
        F: FnMut() -> bool;
}

/// Mask-based gate over a fixed set of signals
#[derive(Debug, Clone, Copy)]
pub struct SignalGate {
    signals: SigSet,
}

impl SignalGate {
    pub fn new(signals: &[Signal]) -> Self {
        let mut set = SigSet::empty();
        for &signal in signals {
            set.add(signal);
        }
        Self { signals: set }
    }

    /// Blocks the gate's signals and returns the mask that was in force.
    ///
    /// Occurrences arriving while held stay pending. A forked child inherits
    /// the held mask.
    pub fn hold(&self) -> Result<SigSet, SchedError> {
        self.signals
            .thread_swap_mask(SigmaskHow::SIG_BLOCK)
            .map_err(SchedError::Mask)
    }

    /// Restores a mask returned by `hold`, delivering anything pending.
    pub fn release(&self, previous: SigSet) -> Result<(), SchedError> {
        previous.thread_set_mask().map_err(SchedError::Mask)
    }

    /// Unblocks the gate's signals regardless of the inherited mask.
    pub fn open(&self) -> Result<(), SchedError> {
        self.signals.thread_unblock().map_err(SchedError::Mask)
    }

    fn without_gate(&self, mut mask: SigSet) -> SigSet {
        for signal in self.signals.iter() {
            mask.remove(signal);
        }
        mask
    }
}

impl Suspend for SignalGate {
    fn wait_until<F>(&self, mut ready: F) -> Result<(), SchedError>
    where
        F: FnMut() -> bool,
    {
        let previous = self.hold()?;
        // Sleep with the gate open even if the caller was born with it held
        let sleeping = self.without_gate(previous);
        let raw: &libc::sigset_t = sleeping.as_ref();
        while !ready() {
            // SAFETY: `sleeping` is a valid, initialised sigset_t. sigsuspend
            // always returns -1/EINTR once a handler ran, which is the wake-up.
            unsafe {
                libc::sigsuspend(raw);
            }
        }
        self.release(previous)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// Polls `ready` on a short interval; stands in for `sigsuspend` when
    /// workers are threads and flags are raised from another thread.
    #[derive(Debug, Clone, Copy)]
    pub struct PollingSuspend {
        pub interval: Duration,
    }

    impl Default for PollingSuspend {
        fn default() -> Self {
            Self {
                interval: Duration::from_millis(1),
            }
        }
    }

    impl Suspend for PollingSuspend {
        fn wait_until<F>(&self, mut ready: F) -> Result<(), SchedError>
        where
            F: FnMut() -> bool,
        {
            while !ready() {
                std::thread::park_timeout(self.interval);
            }
            Ok(())
        }
    }
}
