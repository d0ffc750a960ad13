//! Hand a locator to the instance that already owns the identity.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use viewer_ipc::client::ViewerClient;
use viewer_ipc::IpcError;

use crate::identity::InstanceIdentity;

/// One-shot forwarding of a locator to the first instance.
pub struct Forwarder {
    identity: InstanceIdentity,
    socket_path: PathBuf,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(identity: InstanceIdentity, runtime_dir: &Path, timeout: Duration) -> Self {
        let socket_path = identity.endpoint_in(runtime_dir).socket_path;
        Self {
            identity,
            socket_path,
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Blocking forward with a bounded wait.
    ///
    /// Returns the peer's dispatch result, or false if the peer is missing,
    /// errors, or does not answer within the timeout. Never retried.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`Forwarder::forward_async`] there.
    pub fn forward(&self, locator: &str) -> bool {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "Couldn't start runtime for forwarding");
                return false;
            }
        };
        runtime.block_on(self.forward_async(locator))
    }

    pub async fn forward_async(&self, locator: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.call(locator)).await {
            Ok(Ok(dispatched)) => {
                info!(
                    identity = %self.identity,
                    dispatched,
                    "Forwarded locator to running instance"
                );
                dispatched
            }
            Ok(Err(IpcError::Io(e))) => {
                info!(
                    identity = %self.identity,
                    error = %e,
                    "Call-out to other instance failed (perhaps not running)"
                );
                false
            }
            Ok(Err(e)) => {
                warn!(identity = %self.identity, error = %e, "Call-out to other instance failed");
                false
            }
            Err(_) => {
                warn!(
                    identity = %self.identity,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Other instance did not answer in time"
                );
                false
            }
        }
    }

    async fn call(&self, locator: &str) -> Result<bool, IpcError> {
        let mut client = ViewerClient::connect_to(&self.socket_path).await?;
        client.go_slurl(locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use viewer_config::testing::TestEnvironment;

    #[test]
    fn test_forward_without_peer_fails_fast() {
        let env = TestEnvironment::new().unwrap();
        let config = env.instance_config();
        let forwarder = Forwarder::new(
            InstanceIdentity::from_config(&config),
            &env.runtime_dir,
            Duration::from_secs(5),
        );

        let started = Instant::now();
        assert!(!forwarder.forward("app://region/1/2/3"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_forward_to_unresponsive_peer_times_out() {
        let env = TestEnvironment::new().unwrap();
        let config = env.instance_config();
        let identity = InstanceIdentity::from_config(&config);
        let forwarder = Forwarder::new(
            identity.clone(),
            &env.runtime_dir,
            Duration::from_millis(200),
        );

        // Bound but never accepted: connect succeeds via the backlog, the
        // reply never comes.
        let _listener = std::os::unix::net::UnixListener::bind(forwarder.socket_path()).unwrap();

        let started = Instant::now();
        assert!(!forwarder.forward("app://region/1/2/3"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_forward_to_dead_socket_file_fails() {
        let env = TestEnvironment::new().unwrap();
        let config = env.instance_config();
        let forwarder = Forwarder::new(
            InstanceIdentity::from_config(&config),
            &env.runtime_dir,
            Duration::from_secs(1),
        );
        // Left behind by a crashed instance; nothing listens.
        {
            let _l = std::os::unix::net::UnixListener::bind(forwarder.socket_path()).unwrap();
        }
        assert!(forwarder.socket_path().exists());
        assert!(!forwarder.forward("app://region/1/2/3"));
    }
}
