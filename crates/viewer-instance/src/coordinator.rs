//! Capability set selected at configuration time: socket-backed or no-op.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use viewer_config::{log_instance_debug, InstanceConfig};

use crate::dispatcher::NavigationDispatcher;
use crate::forwarder::Forwarder;
use crate::identity::InstanceIdentity;
use crate::locator::{PeerLocator, Probe, Registration};
use crate::service::DispatchService;
use crate::InstanceError;

pub trait InstanceCoordinator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decide first vs. later instance. Must complete before `serve` or `forward`.
    fn probe_and_register(&self) -> Probe;

    /// Expose the dispatch service for a claimed identity.
    fn serve(
        &self,
        registration: Registration,
        dispatcher: Arc<dyn NavigationDispatcher>,
    ) -> Result<DispatchService, InstanceError>;

    /// Forward `locator` to the first instance. False on any failure.
    fn forward(&self, locator: &str) -> bool;
}

/// Pick the coordinator for `config`.
pub fn coordinator_for(config: &InstanceConfig) -> Box<dyn InstanceCoordinator> {
    if config.enabled {
        Box::new(SocketCoordinator::from_config(config))
    } else {
        log_instance_debug!("Single-instance coordination disabled");
        Box::new(NoopCoordinator)
    }
}

/// Unix-socket transport in the session runtime directory.
pub struct SocketCoordinator {
    identity: InstanceIdentity,
    runtime_dir: PathBuf,
    call_timeout: Duration,
    dispatch_timeout: Duration,
}

impl SocketCoordinator {
    pub fn new(
        identity: InstanceIdentity,
        runtime_dir: PathBuf,
        call_timeout: Duration,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            runtime_dir,
            call_timeout,
            dispatch_timeout,
        }
    }

    pub fn from_config(config: &InstanceConfig) -> Self {
        Self::new(
            InstanceIdentity::from_config(config),
            viewer_config::path::session_runtime_dir(config),
            config.call_timeout(),
            config.dispatch_timeout(),
        )
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }
}

impl InstanceCoordinator for SocketCoordinator {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn probe_and_register(&self) -> Probe {
        PeerLocator::new(self.identity.clone(), self.runtime_dir.clone()).probe_and_register()
    }

    fn serve(
        &self,
        registration: Registration,
        dispatcher: Arc<dyn NavigationDispatcher>,
    ) -> Result<DispatchService, InstanceError> {
        DispatchService::start(registration, dispatcher, self.dispatch_timeout)
    }

    fn forward(&self, locator: &str) -> bool {
        Forwarder::new(self.identity.clone(), &self.runtime_dir, self.call_timeout).forward(locator)
    }
}

/// Used when coordination is off: never first, never forwards.
pub struct NoopCoordinator;

impl InstanceCoordinator for NoopCoordinator {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn probe_and_register(&self) -> Probe {
        Probe::Other
    }

    fn serve(
        &self,
        _registration: Registration,
        _dispatcher: Arc<dyn NavigationDispatcher>,
    ) -> Result<DispatchService, InstanceError> {
        Err(InstanceError::Unavailable(
            "single-instance coordination disabled".to_string(),
        ))
    }

    fn forward(&self, _locator: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_selects_noop() {
        let config = InstanceConfig {
            enabled: false,
            ..InstanceConfig::default()
        };
        let coordinator = coordinator_for(&config);
        assert_eq!(coordinator.name(), "noop");
        assert!(!coordinator.probe_and_register().is_first_instance());
        assert!(!coordinator.forward("app://region/1/2/3"));
    }

    #[test]
    fn test_enabled_config_selects_socket() {
        let config = InstanceConfig {
            enabled: true,
            ..InstanceConfig::default()
        };
        assert_eq!(coordinator_for(&config).name(), "socket");
    }

    #[test]
    fn test_default_config_coordinates() {
        assert!(InstanceConfig::default().enabled);
        assert_eq!(coordinator_for(&InstanceConfig::default()).name(), "socket");
    }
}
