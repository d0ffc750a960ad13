//! Fatal signal hooks.
//!
//! The handler launches the prepared reporter, restores whatever action was
//! registered before, and re-raises so the process still dies with the
//! original signal. Only async-signal-safe work happens inside.

use std::os::raw::c_int;
use std::sync::OnceLock;

use nix::sys::signal::{raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::reporter::PreparedLaunch;
use crate::spawn::fork_exec_detached;
use crate::CrashError;

pub const FATAL_SIGNALS: [Signal; 5] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGABRT,
];

static LAUNCH: OnceLock<PreparedLaunch> = OnceLock::new();
static PREVIOUS: [OnceLock<SigAction>; 5] = [
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
];

/// Route every signal in [`FATAL_SIGNALS`] through the reporter launch.
///
/// Once per process.
pub fn install_fatal_signal_hooks(launch: PreparedLaunch) -> Result<(), CrashError> {
    LAUNCH
        .set(launch)
        .map_err(|_| CrashError::AlreadyInstalled)?;

    let action = SigAction::new(
        SigHandler::Handler(on_fatal_signal),
        SaFlags::SA_RESETHAND | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );
    for (idx, signal) in FATAL_SIGNALS.iter().enumerate() {
        let previous = unsafe { sigaction(*signal, &action) }.map_err(CrashError::Signal)?;
        let _ = PREVIOUS[idx].set(previous);
    }
    Ok(())
}

/// Whether the hooks are in place.
pub fn hooks_installed() -> bool {
    LAUNCH.get().is_some()
}

extern "C" fn on_fatal_signal(signum: c_int) {
    if let Some(launch) = LAUNCH.get() {
        let _ = unsafe { fork_exec_detached(launch) };
    }

    let Ok(signal) = Signal::try_from(signum) else {
        return;
    };
    if let Some(idx) = FATAL_SIGNALS.iter().position(|s| *s == signal) {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        let restore = PREVIOUS[idx].get().unwrap_or(&default);
        unsafe {
            let _ = sigaction(signal, restore);
        }
    }
    // Blocked until this handler returns, then delivered to the restored action.
    let _ = raise(signal);
}
