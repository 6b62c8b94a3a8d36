use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

/// Invoked once loading has finished for a URL, whether it succeeded or not.
///
/// Callbacks for cache hits run synchronously on the thread calling
/// [`IconManager::load`](super::IconManager::load). All others run on a runtime worker thread.
/// Marshaling onto a UI thread is up to the callback.
pub type LoadCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A pending request to load one URL.
pub struct LoadRequest {
    pub url: String,
    pub callback: Option<LoadCallback>,
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("url", &self.url)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl LoadRequest {
    /// Notifies the requester that loading `url` has finished.
    pub fn complete(self) {
        if let Some(callback) = self.callback {
            callback(&self.url);
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    requests: VecDeque<LoadRequest>,
    closed: bool,
}

/// FIFO queue of requests waiting for the dispatch loop.
///
/// Once [closed](Self::close), the queue refuses new requests.
#[derive(Debug, Default)]
pub struct RequestQueue {
    state: Mutex<QueueState>,
}

impl RequestQueue {
    /// Appends `requests`, returning how many were queued.
    ///
    /// Returns `None` and drops the requests if the queue is closed.
    pub fn enqueue(&self, requests: impl IntoIterator<Item = LoadRequest>) -> Option<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let before = state.requests.len();
        state.requests.extend(requests);
        Some(state.requests.len() - before)
    }

    pub fn pop(&self) -> Option<LoadRequest> {
        self.state.lock().unwrap().requests.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the queue and drops all pending requests without completing them.
    ///
    /// Returns the number of dropped requests.
    pub fn close(&self) -> usize {
        let requests = {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            std::mem::take(&mut state.requests)
        };
        requests.len()
    }
}

/// Wakes the dispatch loop when new requests arrive.
///
/// At most one wake-up is remembered while nobody waits, and waiting consumes it. Setting the
/// signal right after the loop found the queue empty therefore still wakes the next wait.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub fn set(&self) {
        self.notify.notify_one();
    }

    /// Waits until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal was set.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}
