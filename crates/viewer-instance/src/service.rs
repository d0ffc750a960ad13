//! Local dispatch service: answers `GoSLURL` calls from later instances.
//!
//! Runs on its own thread with a current-thread tokio runtime, so calls are
//! handled independently of the host's main loop. Navigation itself runs on
//! the blocking pool with a bounded wait.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use viewer_config::{log_dispatch_info, log_dispatch_warn};
use viewer_ipc::frame::{read_frame, write_frame};
use viewer_ipc::{IpcError, ViewerRequest, ViewerResponse};

use crate::dispatcher::{NavigationDispatcher, NavigationRequest};
use crate::locator::Registration;
use crate::InstanceError;

/// Result of one `go_to_location` call.
///
/// `received` is the call-level signal and is always true once the handler
/// runs; `dispatched` is the navigation outcome. A dispatch still running
/// when the wait expires counts as handed off, since it will complete here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoToLocation {
    pub received: bool,
    pub dispatched: bool,
}

/// Bridges incoming calls to the navigation dispatcher.
pub struct DispatchHandler {
    dispatcher: Arc<dyn NavigationDispatcher>,
    dispatch_timeout: Duration,
}

impl DispatchHandler {
    pub fn new(dispatcher: Arc<dyn NavigationDispatcher>, dispatch_timeout: Duration) -> Self {
        Self {
            dispatcher,
            dispatch_timeout,
        }
    }

    /// Dispatch `locator` as an untrusted navigation request.
    pub async fn go_to_location(&self, locator: String) -> GoToLocation {
        log_dispatch_info!("Was asked to go to location", locator = locator.as_str());

        let dispatcher = Arc::clone(&self.dispatcher);
        let request = NavigationRequest::from_peer(locator);
        let task = tokio::task::spawn_blocking(move || dispatcher.dispatch(&request));

        let dispatched = match tokio::time::timeout(self.dispatch_timeout, task).await {
            Ok(Ok(dispatched)) => dispatched,
            Ok(Err(e)) => {
                log_dispatch_warn!(
                    "Navigation dispatcher failed",
                    error = tracing::field::display(&e)
                );
                false
            }
            Err(_) => {
                log_dispatch_warn!(
                    "Navigation dispatch still running, treating as handed off",
                    timeout_ms = self.dispatch_timeout.as_millis() as u64
                );
                true
            }
        };

        GoToLocation {
            received: true,
            dispatched,
        }
    }

    async fn handle_request(&self, request: ViewerRequest) -> ViewerResponse {
        match request {
            ViewerRequest::GoSlurl { locator } => {
                let outcome = self.go_to_location(locator).await;
                ViewerResponse::GoSlurlAck {
                    dispatched: outcome.dispatched,
                }
            }
        }
    }
}

/// A served [`Registration`]. Dropping it stops the service, removes the
/// socket and releases the identity.
pub struct DispatchService {
    handler: Arc<DispatchHandler>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    // Dropped after the serving thread has stopped.
    registration: Option<Registration>,
}

impl DispatchService {
    /// Start serving `registration` on a dedicated thread.
    pub fn start(
        registration: Registration,
        dispatcher: Arc<dyn NavigationDispatcher>,
        dispatch_timeout: Duration,
    ) -> Result<Self, InstanceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("viewer-dispatch")
            .build()?;

        let std_listener = registration.listener_clone()?;
        std_listener.set_nonblocking(true)?;
        let listener = {
            let _guard = runtime.enter();
            UnixListener::from_std(std_listener)?
        };

        let handler = Arc::new(DispatchHandler::new(dispatcher, dispatch_timeout));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let serve_handler = Arc::clone(&handler);
        let thread = std::thread::Builder::new()
            .name("viewer-dispatch".to_string())
            .spawn(move || {
                runtime.block_on(serve(listener, serve_handler, shutdown_rx));
                // Navigation stuck past its timeout must not hold up shutdown.
                runtime.shutdown_timeout(Duration::from_millis(100));
            })?;

        info!(
            identity = %registration.identity(),
            socket = %registration.socket_path().display(),
            "Dispatch service started"
        );

        Ok(Self {
            handler,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            registration: Some(registration),
        })
    }

    pub fn handler(&self) -> Arc<DispatchHandler> {
        Arc::clone(&self.handler)
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.registration.as_ref().map(|r| r.socket_path())
    }

    /// Stop serving and release the identity.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Dispatch service thread panicked");
            }
        }
        if let Some(registration) = self.registration.take() {
            debug!(identity = %registration.identity(), "Dispatch service stopped");
        }
    }
}

impl Drop for DispatchService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: UnixListener,
    handler: Arc<DispatchHandler>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, handler).await {
                                warn!(error = %e, "Dispatch client error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = &mut shutdown_rx => {
                debug!("Dispatch service shutting down");
                break;
            }
        }
    }
}

/// Serve one connection until the peer hangs up.
async fn handle_client(mut stream: UnixStream, handler: Arc<DispatchHandler>) -> Result<(), IpcError> {
    debug!("Dispatch client connected");

    loop {
        let request: ViewerRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(IpcError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Dispatch client disconnected");
                return Ok(());
            }
            Err(IpcError::Codec(e)) => {
                warn!(error = %e, "Failed to decode request");
                let response = ViewerResponse::Error(format!("Invalid request: {}", e));
                write_frame(&mut stream, &response).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        debug!(method = request.method_name(), "Received request");
        let response = handler.handle_request(request).await;
        write_frame(&mut stream, &response).await?;
    }
}
