//! # viewer-instance
//!
//! Single-instance coordination for the viewer.
//!
//! ## Flow
//!
//! 1. [`PeerLocator::probe_and_register`] claims the well-known
//!    [`InstanceIdentity`] in the session runtime directory.
//! 2. The first instance turns its [`Registration`] into a running
//!    [`DispatchService`] that answers `GoSLURL` calls from later instances.
//! 3. A later instance hands its locator to the [`Forwarder`] and exits.
//!
//! The [`InstanceCoordinator`] trait bundles the three so the bootstrap can
//! swap in [`NoopCoordinator`] when coordination is disabled.
//!
//! ## Endpoint layout
//!
//! ```text
//! $XDG_RUNTIME_DIR/
//! ├── <service>-<path>.lock   # exclusive flock held by the first instance
//! └── <service>-<path>.sock   # dispatch socket bound by the lock holder
//! ```

#[cfg(not(unix))]
compile_error!("viewer-instance needs Unix domain sockets and flock");

pub mod coordinator;
pub mod dispatcher;
pub mod forwarder;
pub mod identity;
pub mod locator;
pub mod service;

pub use coordinator::{coordinator_for, InstanceCoordinator, NoopCoordinator, SocketCoordinator};
pub use dispatcher::{
    navigation_queue, NavigationDispatcher, NavigationQueue, NavigationRequest, QueueDispatcher,
};
pub use forwarder::Forwarder;
pub use identity::{Endpoint, InstanceIdentity};
pub use locator::{PeerLocator, Probe, Registration};
pub use service::{DispatchHandler, DispatchService, GoToLocation};

use viewer_ipc::IpcError;

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
    #[error("Instance identity already claimed: {0}")]
    AlreadyClaimed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
}
