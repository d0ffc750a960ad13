//! Panic-hook interceptor lifecycle. The hook is process-global, so the whole
//! lifecycle runs in one test.

use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use viewer_crash::{CrashError, FaultInterceptor, FaultTrap, InterceptorState};

static PREVIOUS_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct CountingTrap {
    hits: AtomicUsize,
}

impl FaultTrap for CountingTrap {
    fn trigger(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_interceptor_lifecycle() {
    panic::set_hook(Box::new(|_| {
        PREVIOUS_CALLS.fetch_add(1, Ordering::SeqCst);
    }));

    let trap = Arc::new(CountingTrap::default());
    assert_eq!(FaultInterceptor::state(), InterceptorState::Uninstalled);
    FaultInterceptor::install(trap.clone()).unwrap();
    assert_eq!(FaultInterceptor::state(), InterceptorState::Installed);
    assert!(matches!(
        FaultInterceptor::install(trap.clone()),
        Err(CrashError::AlreadyInstalled)
    ));

    // First fault: trap fires, then the previous hook still runs.
    assert!(panic::catch_unwind(|| panic!("first")).is_err());
    assert_eq!(trap.hits.load(Ordering::SeqCst), 1);
    assert_eq!(PREVIOUS_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(FaultInterceptor::state(), InterceptorState::Fired);

    // Later faults fall straight through to the previous hook.
    assert!(panic::catch_unwind(|| panic!("second")).is_err());
    assert_eq!(trap.hits.load(Ordering::SeqCst), 1);
    assert_eq!(PREVIOUS_CALLS.load(Ordering::SeqCst), 2);

    FaultInterceptor::uninstall().unwrap();
    assert_eq!(FaultInterceptor::state(), InterceptorState::Uninstalled);
    assert!(matches!(
        FaultInterceptor::uninstall(),
        Err(CrashError::NotInstalled)
    ));

    // The previous hook is back in charge.
    assert!(panic::catch_unwind(|| panic!("third")).is_err());
    assert_eq!(trap.hits.load(Ordering::SeqCst), 1);
    assert_eq!(PREVIOUS_CALLS.load(Ordering::SeqCst), 3);

    drop(panic::take_hook());
}
