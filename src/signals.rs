//! Stop requests from signals.
//!
//! SIGINT and SIGTERM are handled through `ctrlc`, SIGUSR1 through a raw
//! `sigaction` handler. Handlers only store to an atomic; the sampler polls
//! [`ShutdownFlag::is_requested`] between sleep slices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::{info, warn};

/// Set from the SIGUSR1 handler, which cannot reach any owned state.
static SIGUSR1_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigusr1(_: c_int) {
    SIGUSR1_RECEIVED.store(true, Ordering::SeqCst);
}

/// Cloneable stop flag owned by the sampler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    stop: Arc<AtomicBool>,
    watch_sigusr1: bool,
}

impl ShutdownFlag {
    /// A flag that only [`request`](Self::request) can set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag wired to SIGINT, SIGTERM and SIGUSR1.
    ///
    /// Installation failures are logged; monitoring then simply runs until
    /// the target exits.
    pub fn with_signal_handlers() -> Self {
        let mut flag = Self::new();
        let stop = flag.stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!(error = %e, "failed to install SIGINT/SIGTERM handler");
        }
        match install_sigusr1() {
            Ok(()) => flag.watch_sigusr1 = true,
            Err(e) => warn!(error = %e, "failed to install SIGUSR1 handler"),
        }
        flag
    }

    pub fn request(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        if self.watch_sigusr1 && SIGUSR1_RECEIVED.load(Ordering::SeqCst) {
            info!("SIGUSR1 received, stopping");
            self.stop.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }
}

fn install_sigusr1() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigusr1),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe.
    unsafe { sigaction(Signal::SIGUSR1, &action) }?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_shared_by_clones() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!flag.is_requested());
        other.request();
        assert!(flag.is_requested());
    }

    #[test]
    fn test_plain_flag_ignores_sigusr1_state() {
        let flag = ShutdownFlag::new();
        SIGUSR1_RECEIVED.store(true, Ordering::SeqCst);
        assert!(!flag.is_requested());
        SIGUSR1_RECEIVED.store(false, Ordering::SeqCst);
    }
}
