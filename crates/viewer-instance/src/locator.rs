//! Peer probe and identity claim.
//!
//! The claim is an exclusive, non-blocking `flock` on the identity's lock
//! file. The kernel drops the lock when its holder dies, so a lock that can
//! be taken means any socket file still lying around is stale.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info, warn};

use crate::identity::{Endpoint, InstanceIdentity};
use crate::InstanceError;

/// Outcome of [`PeerLocator::probe_and_register`].
#[derive(Debug)]
pub enum Probe {
    /// This process holds the identity. Keep the registration alive for the
    /// lifetime of the process.
    First(Registration),
    /// Another instance holds the identity, or the transport is unusable.
    Other,
}

impl Probe {
    pub fn is_first_instance(&self) -> bool {
        matches!(self, Probe::First(_))
    }

    pub fn into_registration(self) -> Option<Registration> {
        match self {
            Probe::First(registration) => Some(registration),
            Probe::Other => None,
        }
    }
}

/// Exclusive hold on an [`InstanceIdentity`] plus its bound, not yet served,
/// socket. Dropping it removes the socket file and releases the claim.
pub struct Registration {
    identity: InstanceIdentity,
    endpoint: Endpoint,
    listener: UnixListener,
    // Dropped last: the socket file goes away before the claim is released.
    _lock: Flock<File>,
}

impl Registration {
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn socket_path(&self) -> &Path {
        &self.endpoint.socket_path
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Independent handle on the bound listener for the serving runtime.
    pub(crate) fn listener_clone(&self) -> std::io::Result<UnixListener> {
        self.listener.try_clone()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.endpoint.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    socket = %self.endpoint.socket_path.display(),
                    error = %e,
                    "Failed to remove dispatch socket"
                );
            }
        }
        debug!(identity = %self.identity, "Released instance identity");
    }
}

/// Finds out whether another instance already owns the identity.
pub struct PeerLocator {
    identity: InstanceIdentity,
    runtime_dir: PathBuf,
}

impl PeerLocator {
    pub fn new(identity: InstanceIdentity, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            runtime_dir: runtime_dir.into(),
        }
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> Endpoint {
        self.identity.endpoint_in(&self.runtime_dir)
    }

    /// Claim the identity, or report that this is not the first instance.
    ///
    /// Never retries: a held claim means "another instance exists", and an
    /// unusable transport is treated the same way.
    pub fn probe_and_register(&self) -> Probe {
        match self.try_claim() {
            Ok(registration) => {
                info!(
                    identity = %self.identity,
                    socket = %registration.socket_path().display(),
                    "Registered as first instance"
                );
                Probe::First(registration)
            }
            Err(InstanceError::AlreadyClaimed(_)) => {
                info!(identity = %self.identity, "Another instance holds the identity");
                Probe::Other
            }
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "Instance transport unavailable");
                Probe::Other
            }
        }
    }

    /// Take the lock and bind the socket.
    pub fn try_claim(&self) -> Result<Registration, InstanceError> {
        viewer_config::path::ensure_private_dir(&self.runtime_dir)
            .map_err(|e| InstanceError::Unavailable(format!("{:#}", e)))?;

        let endpoint = self.endpoint();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&endpoint.lock_path)?;

        let lock = match Flock::lock(lock_file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(InstanceError::AlreadyClaimed(self.identity.to_string()));
            }
            Err((_, errno)) => {
                return Err(InstanceError::Unavailable(format!(
                    "flock {}: {}",
                    endpoint.lock_path.display(),
                    errno
                )));
            }
        };

        // We hold the lock, so nobody is serving this socket.
        match std::fs::remove_file(&endpoint.socket_path) {
            Ok(()) => debug!(
                socket = %endpoint.socket_path.display(),
                "Removed stale dispatch socket"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&endpoint.socket_path)?;

        Ok(Registration {
            identity: self.identity.clone(),
            endpoint,
            listener,
            _lock: lock,
        })
    }
}
