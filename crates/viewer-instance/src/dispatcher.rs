//! Navigation dispatch collaborator.
//!
//! The dispatch service calls into the host application through
//! [`NavigationDispatcher`] from its own thread. Hosts that keep their state on
//! the main loop use [`navigation_queue`] and drain the [`NavigationQueue`]
//! once per frame.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Opaque handle of the UI element a navigation originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub locator: String,
    pub referrer: String,
    pub context: Option<ContextHandle>,
    /// False for anything arriving from outside this process.
    pub trusted: bool,
}

impl NavigationRequest {
    /// Request arriving from another process: no referrer, no context, untrusted.
    pub fn from_peer(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            referrer: String::new(),
            context: None,
            trusted: false,
        }
    }

    /// Request given to this process directly, e.g. on its command line.
    pub fn local(locator: impl Into<String>) -> Self {
        Self {
            trusted: true,
            ..Self::from_peer(locator)
        }
    }
}

pub trait NavigationDispatcher: Send + Sync {
    /// Returns whether the locator was accepted for navigation.
    fn dispatch(&self, request: &NavigationRequest) -> bool;
}

impl<F> NavigationDispatcher for F
where
    F: Fn(&NavigationRequest) -> bool + Send + Sync,
{
    fn dispatch(&self, request: &NavigationRequest) -> bool {
        self(request)
    }
}

/// Create a dispatcher/queue pair bridging the service thread to the host loop.
pub fn navigation_queue() -> (QueueDispatcher, NavigationQueue) {
    let (tx, rx) = mpsc::channel();
    (QueueDispatcher { tx }, NavigationQueue { rx })
}

/// Validates locators and queues them for the host loop.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: Sender<NavigationRequest>,
}

impl NavigationDispatcher for QueueDispatcher {
    fn dispatch(&self, request: &NavigationRequest) -> bool {
        if request.locator.trim().is_empty() {
            return false;
        }
        // Fails only once the host dropped its queue.
        self.tx.send(request.clone()).is_ok()
    }
}

/// Host side of [`navigation_queue`].
pub struct NavigationQueue {
    rx: Receiver<NavigationRequest>,
}

impl NavigationQueue {
    /// Next pending request, if any, without blocking.
    pub fn try_next(&self) -> Option<NavigationRequest> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next request.
    pub fn next_timeout(&self, timeout: Duration) -> Option<NavigationRequest> {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued so far.
    pub fn drain(&self) -> Vec<NavigationRequest> {
        self.rx.try_iter().collect()
    }
}
