//! # viewer-crash
//!
//! Turns every unrecoverable fault into one crash path: the external
//! diagnostic reporter is launched, detached, with the identifying context of
//! the dying process.
//!
//! ```text
//! panic ──► FaultInterceptor ──► raise(SIGSEGV) ─┐
//! SIGSEGV/SIGBUS/SIGILL/SIGFPE/SIGABRT ──────────┴─► on_fatal_signal
//!                                                     ├─ fork/exec reporter (detached)
//!                                                     └─ restore previous action, re-raise
//! ```
//!
//! The reporter argv is prepared up front so the signal path never allocates.

pub mod debugger;
pub mod interceptor;
pub mod reporter;
pub mod signals;
pub mod spawn;

pub use debugger::being_debugged;
pub use interceptor::{FaultInterceptor, FaultTrap, InterceptorState, SignalTrap};
pub use reporter::{flush_output_streams, CrashReporter, PreparedLaunch, ReporterContext};
pub use spawn::{DetachedChild, DetachedSpawner, ForkExecSpawner, SpawnError};

use std::sync::Arc;

use nix::errno::Errno;
use viewer_config::{log_crash_info, CrashConfig};

#[derive(Debug, thiserror::Error)]
pub enum CrashError {
    #[error("Crash handling already installed")]
    AlreadyInstalled,
    #[error("Fault interceptor not installed")]
    NotInstalled,
    #[error("Invalid reporter argument: {0}")]
    InvalidArgument(#[from] std::ffi::NulError),
    #[error("Cannot resolve reporter context: {0}")]
    Context(String),
    #[error("Unknown signal name: {0}")]
    UnknownSignal(String),
    #[error("Signal setup failed: {0}")]
    Signal(Errno),
    #[error("Spawn failed: {0}")]
    Spawn(#[from] SpawnError),
}

/// Install the full crash path described by `config`: fatal signal hooks with
/// a prepared reporter launch, then the panic-hook fault interceptor.
///
/// Call once, early, from the main thread.
pub fn install_crash_handling(config: &CrashConfig) -> Result<ReporterContext, CrashError> {
    let context = ReporterContext::from_config(config)?;
    let launch = context.prepare(false)?;
    signals::install_fatal_signal_hooks(launch)?;

    let trap = SignalTrap::from_name(&config.trap_signal)?;
    FaultInterceptor::install(Arc::new(trap))?;

    log_crash_info!(
        "Crash handling installed",
        reporter = tracing::field::display(context.reporter_path.display()),
        pid = context.pid
    );
    Ok(context)
}
