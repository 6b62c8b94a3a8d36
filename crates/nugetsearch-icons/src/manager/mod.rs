//! The icon manager: throttled, de-duplicated background loading of icons.
//!
//! Requests for URLs that are already resolved are answered synchronously. All others are
//! queued and picked up by a single dispatch loop, which spawns one fetch task per request.
//! Fetch tasks share a [`Throttle`] that bounds how many icons are fetched and decoded at once.
//!
//! Concurrent requests for the same URL may lead to more than one fetch, but only the first
//! result is stored. Every request still gets its callback exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::caching::{CacheEntry, IconStore};
use crate::config::IconManagerConfig;
use crate::fetch::IconSource;
use crate::utils::futures::CallOnDrop;

mod dispatch;
mod queue;
mod throttle;

pub use queue::{LoadCallback, LoadRequest, RequestQueue, WakeSignal};
pub use throttle::{Throttle, ThrottleSlot};

/// State shared between the manager, its dispatch loop and the fetch tasks.
struct Shared<T> {
    config: IconManagerConfig,
    source: Arc<dyn IconSource<Icon = T>>,
    store: IconStore<T>,
    queue: RequestQueue,
    wake: WakeSignal,
    throttle: Throttle,
    disposed: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl<T> Shared<T> {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Counts a running fetch task until the returned token is dropped.
    fn track_in_flight(&self) -> CallOnDrop {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = Arc::clone(&self.in_flight);
        CallOnDrop::new(move || {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Loads icons in the background and caches them by URL.
///
/// The manager is meant to be created once by the application and handed to every consumer
/// as an `Arc<IconManager<T>>`. All methods are cheap and may be called from any thread,
/// including a UI thread. They never wait for a download.
///
/// Icons stay cached until the manager is [disposed](Self::dispose). Failed loads are cached
/// as well and never retried.
pub struct IconManager<T> {
    shared: Arc<Shared<T>>,
    dispatch_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<T> fmt::Debug for IconManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IconManager")
            .field("config", &self.shared.config)
            .field("store", &self.shared.store)
            .field("pending", &self.shared.queue.len())
            .field("in_flight", &self.shared.in_flight.load(Ordering::Relaxed))
            .field("disposed", &self.shared.is_disposed())
            .finish()
    }
}

impl<T> IconManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a manager loading icons from `source` and starts its dispatch loop on `runtime`.
    pub fn new<S>(config: IconManagerConfig, source: S, runtime: &Handle) -> Arc<Self>
    where
        S: IconSource<Icon = T>,
    {
        Self::with_shared_source(config, Arc::new(source), runtime)
    }

    /// Creates a manager from a source that is shared with other consumers.
    pub fn with_shared_source(
        config: IconManagerConfig,
        source: Arc<dyn IconSource<Icon = T>>,
        runtime: &Handle,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            config,
            source,
            store: IconStore::new(),
            queue: RequestQueue::default(),
            wake: WakeSignal::default(),
            throttle: Throttle::new(config.throttle_capacity, config.throttle_timeout),
            disposed: AtomicBool::new(false),
            in_flight: Default::default(),
        });

        let dispatch_loop = runtime.spawn(dispatch::run(Arc::clone(&shared)));

        Arc::new(Self {
            shared,
            dispatch_loop: Mutex::new(Some(dispatch_loop)),
        })
    }

    /// Loads `urls`, invoking `callback` with each URL once it has finished loading.
    ///
    /// For URLs that are already resolved, the callback runs right away on the calling
    /// thread, before this method returns, in the order given. All other URLs are queued and
    /// their callback runs on a background thread once the fetch completes, in no particular
    /// order. The callback fires for failed loads too; use [`get_icon`](Self::get_icon) to
    /// find out whether an icon is available.
    ///
    /// Does nothing once the manager is disposed.
    pub fn load<I, F>(&self, urls: I, callback: F)
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.load_with(urls, Some(Arc::new(callback)));
    }

    /// Loads a single URL, see [`load`](Self::load).
    pub fn load_one<F>(&self, url: impl Into<String>, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.load([url.into()], callback);
    }

    /// Loads `urls` without being notified.
    pub fn prefetch<I>(&self, urls: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.load_with(urls, None);
    }

    /// Loads `urls` with an already shared callback.
    pub fn load_with<I>(&self, urls: I, callback: Option<LoadCallback>)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        if self.shared.is_disposed() {
            tracing::debug!("Ignoring icon load on a disposed icon manager");
            return;
        }

        let mut resolved = Vec::new();
        let mut requests = Vec::new();
        for url in urls {
            let url = url.into();
            metric!(counter("icons.access") += 1);
            if self.shared.store.has(&url) {
                metric!(counter("icons.memory.hit") += 1);
                resolved.push(url);
            } else {
                requests.push(LoadRequest {
                    url,
                    callback: callback.clone(),
                });
            }
        }

        if !requests.is_empty() {
            // closed by a concurrent dispose
            let Some(queued) = self.shared.queue.enqueue(requests) else {
                tracing::debug!("Ignoring icon load on a disposed icon manager");
                return;
            };
            tracing::trace!(queued, "Queued icon requests");
            self.shared.wake.set();
        }

        if let Some(callback) = callback {
            for url in &resolved {
                callback(url);
            }
        }
    }

    /// Returns `true` if `url` has finished loading, successfully or not.
    pub fn is_loaded(&self, url: &str) -> bool {
        self.shared.store.has(url)
    }

    /// Returns the icon for `url`, if it has been loaded successfully.
    pub fn get_icon(&self, url: &str) -> Option<T> {
        self.shared.store.get(url)
    }

    /// Returns the outcome of loading `url`, if it has finished loading.
    pub fn entry(&self, url: &str) -> Option<CacheEntry<T>> {
        self.shared.store.entry(url)
    }
}

impl<T> IconManager<T> {
    /// The number of queued requests that have not been dispatched yet.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// The number of fetch tasks that are currently running or waiting for the throttle.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stops the manager and releases all cached icons.
    ///
    /// The dispatch loop stops picking up requests, the throttle is closed and queued
    /// requests are dropped. Fetches that are already running complete, but their results
    /// are discarded and their callbacks are not invoked.
    ///
    /// Calling this more than once, or from several threads, is harmless. It is also called
    /// when the manager is dropped.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.wake.set();
        self.shared.throttle.close();
        let dropped = self.shared.queue.close();
        let released = self.shared.store.close();

        metric!(counter("icons.disposed") += 1);
        tracing::debug!(released, dropped, "Icon manager disposed");
    }

    /// Disposes the manager and waits for the dispatch loop to exit.
    pub async fn shutdown(&self) {
        self.dispose();

        let dispatch_loop = self.dispatch_loop.lock().unwrap().take();
        if let Some(dispatch_loop) = dispatch_loop {
            if let Err(e) = dispatch_loop.await {
                tracing::error!(error = &e as &dyn std::error::Error, "Icon dispatch loop failed");
            }
        }
    }
}

impl<T> Drop for IconManager<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
