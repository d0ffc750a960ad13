//! Startup sequence.
//!
//! ```text
//! env hygiene ─► crash handling ─► probe ─┬─ First ─► serve ─────────► Primary
//!                                         └─ Other ─► forward ─┬─ ok ─► Forwarded
//!                                                              └─ err ─► Standalone
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use viewer_config::{log_boot_debug, log_boot_info, log_boot_warn, Config, CrashConfig};
use viewer_crash::CrashReporter;
use viewer_instance::{
    coordinator_for, navigation_queue, DispatchService, InstanceCoordinator, NavigationDispatcher,
    NavigationQueue, NavigationRequest, Probe, QueueDispatcher,
};

use crate::{env, plugin};

/// How this process continues after bootstrap.
pub enum Startup {
    /// The request went to the running instance; exit successfully.
    Forwarded,
    /// This process owns the identity and serves peers.
    Primary {
        service: DispatchService,
        queue: NavigationQueue,
    },
    /// Running alone without serving peers.
    Standalone { queue: NavigationQueue },
}

impl Startup {
    pub fn name(&self) -> &'static str {
        match self {
            Startup::Forwarded => "forwarded",
            Startup::Primary { .. } => "primary",
            Startup::Standalone { .. } => "standalone",
        }
    }
}

/// Result of [`Bootstrap::launch`].
pub struct Launch {
    pub startup: Startup,
    /// On-demand reporter (freeze reports); present once crash handling is
    /// installed.
    pub crash_reporter: Option<CrashReporter>,
}

pub struct Bootstrap {
    config: Config,
    locator: Option<String>,
    coordinator: Box<dyn InstanceCoordinator>,
    crash_handling: bool,
    logs_dir: PathBuf,
}

impl Bootstrap {
    pub fn new(config: Config, locator: Option<String>) -> Self {
        let coordinator = coordinator_for(&config.instance);
        let crash_handling = config.crash.enabled;
        Self {
            config,
            locator: locator.filter(|l| !l.trim().is_empty()),
            coordinator,
            crash_handling,
            logs_dir: viewer_config::path::logs_dir(),
        }
    }

    pub fn with_coordinator(mut self, coordinator: Box<dyn InstanceCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    /// Skip installing process-wide crash handling.
    pub fn without_crash_handling(mut self) -> Self {
        self.crash_handling = false;
        self
    }

    pub fn run(self) -> Result<Startup> {
        self.launch().map(|launch| launch.startup)
    }

    /// Like [`Bootstrap::run`], keeping the crash reporter for the host.
    pub fn launch(self) -> Result<Launch> {
        prepare_environment(&self.config, &self.logs_dir);

        let crash_reporter = if self.crash_handling {
            install_crash_handling(&self.config.crash)
        } else {
            None
        };

        log_boot_debug!("Probing for running instance", via = self.coordinator.name());
        let startup = match self.coordinator.probe_and_register() {
            Probe::Other => self.continue_as_secondary(),
            Probe::First(registration) => {
                let (dispatcher, queue) = navigation_queue();
                self.enqueue_startup_locator(&dispatcher);
                match self.coordinator.serve(registration, Arc::new(dispatcher)) {
                    Ok(service) => Startup::Primary { service, queue },
                    Err(e) => {
                        log_boot_warn!(
                            "Dispatch service failed to start, running standalone",
                            error = tracing::field::display(&e)
                        );
                        Startup::Standalone { queue }
                    }
                }
            }
        };

        log_boot_info!(
            "Startup complete",
            mode = startup.name(),
            crash_reporter = crash_reporter.is_some()
        );
        Ok(Launch {
            startup,
            crash_reporter,
        })
    }

    fn continue_as_secondary(&self) -> Startup {
        if let Some(locator) = &self.locator {
            if self.coordinator.forward(locator) {
                return Startup::Forwarded;
            }
            log_boot_warn!("Could not hand off to running instance, continuing alone");
        }
        let (dispatcher, queue) = navigation_queue();
        self.enqueue_startup_locator(&dispatcher);
        Startup::Standalone { queue }
    }

    fn enqueue_startup_locator(&self, dispatcher: &QueueDispatcher) {
        if let Some(locator) = &self.locator {
            dispatcher.dispatch(&NavigationRequest::local(locator.clone()));
        }
    }
}

/// Environment hygiene: preload scrub, plugin probe, legacy log cleanup.
pub fn prepare_environment(config: &Config, logs_dir: &Path) {
    env::scrub_preload();
    plugin::export_plugin_vars(&config.plugin);
    env::remove_legacy_artifacts(logs_dir);
}

/// Install crash handling unless a debugger is attached. Never fails startup.
pub fn install_crash_handling(crash: &CrashConfig) -> Option<CrashReporter> {
    if crash.skip_when_debugged && viewer_crash::being_debugged() {
        log_boot_info!("Debugger attached, leaving faults to it");
        return None;
    }
    match viewer_crash::install_crash_handling(crash) {
        Ok(context) => Some(CrashReporter::with_fork_exec(context)),
        Err(e) => {
            log_boot_warn!(
                "Crash handling not installed",
                error = tracing::field::display(&e)
            );
            None
        }
    }
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signum: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the returned stop flag.
pub fn install_stop_handlers() -> Result<&'static AtomicBool> {
    let action = SigAction::new(
        SigHandler::Handler(request_stop),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { sigaction(signal, &action) }
            .with_context(|| format!("Failed to install {:?} handler", signal))?;
    }
    Ok(&STOP_REQUESTED)
}

/// Headless host loop: hand queued navigations to `navigate` until `stop`.
///
/// Returns how many requests were handled.
pub fn run_headless<F>(queue: &NavigationQueue, stop: &AtomicBool, mut navigate: F) -> usize
where
    F: FnMut(NavigationRequest),
{
    let mut handled = 0;
    while !stop.load(Ordering::SeqCst) {
        if let Some(request) = queue.next_timeout(Duration::from_millis(200)) {
            navigate(request);
            handled += 1;
        }
    }
    // Whatever arrived while stopping.
    for request in queue.drain() {
        navigate(request);
        handled += 1;
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_headless_until_stopped() {
        let (dispatcher, queue) = navigation_queue();
        let stop = Arc::new(AtomicBool::new(false));

        dispatcher.dispatch(&NavigationRequest::from_peer("app://region/a/1/1/1"));
        let feeder = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                dispatcher.dispatch(&NavigationRequest::from_peer("app://region/b/1/1/1"));
                std::thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::SeqCst);
            })
        };

        let mut seen = Vec::new();
        let handled = run_headless(&queue, &stop, |r| seen.push(r.locator));
        feeder.join().unwrap();

        assert_eq!(handled, 2);
        assert_eq!(seen, vec!["app://region/a/1/1/1", "app://region/b/1/1/1"]);
    }

    #[test]
    fn test_startup_names() {
        let (_, queue) = navigation_queue();
        assert_eq!(Startup::Standalone { queue }.name(), "standalone");
        assert_eq!(Startup::Forwarded.name(), "forwarded");
    }

    #[test]
    fn test_blank_locator_ignored() {
        let bootstrap = Bootstrap::new(Config::default(), Some("  ".to_string()));
        assert!(bootstrap.locator.is_none());
    }
}
