//! Process-wide fault interceptor on top of the panic hook.
//!
//! Installing captures the previously registered hook. The first fault after
//! installation disarms the interceptor and fires the trap, which normally
//! does not return (it raises a fatal signal that the crash path catches).
//! Any later or nested fault finds the interceptor disarmed and goes straight
//! to the previous hook, so handling never recurses.

use std::panic::{self, PanicHookInfo};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use nix::sys::signal::{raise, signal, SigHandler, Signal};
use viewer_config::log_crash_error;

use crate::reporter::flush_output_streams;
use crate::CrashError;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Deliberate escalation into the crash path.
pub trait FaultTrap: Send + Sync {
    fn trigger(&self);
}

/// Raises a fatal signal at the faulting point.
#[derive(Debug, Clone, Copy)]
pub struct SignalTrap {
    signal: Signal,
}

impl SignalTrap {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }

    /// Parse a signal name such as `"SIGSEGV"`.
    pub fn from_name(name: &str) -> Result<Self, CrashError> {
        Signal::from_str(name)
            .map(Self::new)
            .map_err(|_| CrashError::UnknownSignal(name.to_string()))
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl Default for SignalTrap {
    fn default() -> Self {
        Self::new(Signal::SIGSEGV)
    }
}

impl FaultTrap for SignalTrap {
    fn trigger(&self) {
        let _ = raise(self.signal);
        // A chained handler may return instead of terminating; the trap must not.
        unsafe {
            let _ = signal(self.signal, SigHandler::SigDfl);
        }
        let _ = raise(self.signal);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    Uninstalled,
    Installed,
    Fired,
}

struct Installed {
    previous: PanicHook,
    trap: Arc<dyn FaultTrap>,
    armed: AtomicBool,
}

impl Installed {
    fn new(previous: PanicHook, trap: Arc<dyn FaultTrap>) -> Self {
        Self {
            previous,
            trap,
            armed: AtomicBool::new(true),
        }
    }

    /// Fire the trap if still armed. Returns whether it fired.
    fn escalate_once(&self) -> bool {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return false;
        }
        flush_output_streams();
        self.trap.trigger();
        true
    }

    fn on_fault(&self, info: &PanicHookInfo<'_>) {
        if self.armed.load(Ordering::SeqCst) {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            log_crash_error!(
                "Unrecoverable fault, escalating to crash reporter",
                location = location.as_str()
            );
        }
        self.escalate_once();
        (self.previous)(info);
    }
}

static INTERCEPTOR: Mutex<Option<Arc<Installed>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<Installed>>> {
    INTERCEPTOR.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to the single process-wide interceptor.
pub struct FaultInterceptor;

impl FaultInterceptor {
    /// Take over the panic hook, remembering the previous one.
    pub fn install(trap: Arc<dyn FaultTrap>) -> Result<(), CrashError> {
        let mut slot = slot();
        if slot.is_some() {
            return Err(CrashError::AlreadyInstalled);
        }

        let installed = Arc::new(Installed::new(panic::take_hook(), trap));
        let hook = Arc::clone(&installed);
        panic::set_hook(Box::new(move |info| hook.on_fault(info)));
        *slot = Some(installed);
        Ok(())
    }

    /// Put the previous hook back. Not callable from a panicking thread.
    pub fn uninstall() -> Result<(), CrashError> {
        let mut slot = slot();
        let installed = slot.take().ok_or(CrashError::NotInstalled)?;

        // Dropping our hook releases its reference to `installed`.
        drop(panic::take_hook());
        if let Ok(inner) = Arc::try_unwrap(installed) {
            panic::set_hook(inner.previous);
        }
        Ok(())
    }

    pub fn state() -> InterceptorState {
        match slot().as_ref() {
            None => InterceptorState::Uninstalled,
            Some(i) if i.armed.load(Ordering::SeqCst) => InterceptorState::Installed,
            Some(_) => InterceptorState::Fired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};

    #[derive(Default)]
    struct ReentrantTrap {
        hits: AtomicUsize,
        nested_fired: AtomicBool,
        target: OnceLock<Weak<Installed>>,
    }

    impl FaultTrap for ReentrantTrap {
        fn trigger(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            // A second fault while the first is being handled.
            if let Some(installed) = self.target.get().and_then(Weak::upgrade) {
                if installed.escalate_once() {
                    self.nested_fired.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    #[test]
    fn test_nested_fault_does_not_recurse() {
        let trap = Arc::new(ReentrantTrap::default());
        let installed = Arc::new(Installed::new(Box::new(|_| {}), trap.clone()));
        trap.target.set(Arc::downgrade(&installed)).ok().unwrap();

        assert!(installed.escalate_once());
        assert_eq!(trap.hits.load(Ordering::SeqCst), 1);
        assert!(!trap.nested_fired.load(Ordering::SeqCst));

        // Disarmed for good.
        assert!(!installed.escalate_once());
        assert_eq!(trap.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_trap_from_name() {
        assert_eq!(SignalTrap::from_name("SIGSEGV").unwrap().signal(), Signal::SIGSEGV);
        assert_eq!(SignalTrap::from_name("SIGABRT").unwrap().signal(), Signal::SIGABRT);
        assert!(matches!(
            SignalTrap::from_name("SIGNOPE"),
            Err(CrashError::UnknownSignal(_))
        ));
        assert_eq!(SignalTrap::default().signal(), Signal::SIGSEGV);
    }
}
