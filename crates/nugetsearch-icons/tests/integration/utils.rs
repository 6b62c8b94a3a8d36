use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nugetsearch_icons::config::IconManagerConfig;
use nugetsearch_icons::fetch::FnSource;
use nugetsearch_icons::{CacheEntry, IconError, source_fn};
use tokio::sync::Notify;

pub use nugetsearch_test::*;

pub fn manager_config(capacity: usize) -> IconManagerConfig {
    IconManagerConfig {
        throttle_capacity: capacity,
        throttle_timeout: Duration::from_secs(30),
        ..Default::default()
    }
}

/// Counts fetches and the peak number of concurrently running fetches.
#[derive(Debug, Default)]
pub struct FetchCounter {
    running: AtomicUsize,
    peak: AtomicUsize,
    fetches: Mutex<BTreeMap<String, usize>>,
}

impl FetchCounter {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn fetches(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

pub type CountingFn =
    Box<dyn Fn(String) -> futures::future::BoxFuture<'static, CacheEntry<usize>> + Send + Sync>;

/// An in-memory source resolving every URL to its length after `latency`.
///
/// URLs starting with `missing/` fail with [`IconError::NotFound`].
pub fn counting_source(latency: Duration) -> (FnSource<CountingFn>, Arc<FetchCounter>) {
    let counter = Arc::new(FetchCounter::default());
    let source_counter = Arc::clone(&counter);
    let f: CountingFn = Box::new(move |url: String| {
        let counter = Arc::clone(&source_counter);
        Box::pin(async move {
            *counter.fetches.lock().unwrap().entry(url.clone()).or_default() += 1;
            let running = counter.running.fetch_add(1, Ordering::SeqCst) + 1;
            counter.peak.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(latency).await;
            counter.running.fetch_sub(1, Ordering::SeqCst);

            if url.starts_with("missing/") {
                Err(IconError::NotFound)
            } else {
                Ok(url.len())
            }
        })
    });
    (source_fn(f), counter)
}

/// Records completion callbacks so tests can wait for them.
#[derive(Debug, Default)]
pub struct Completions {
    seen: Mutex<Vec<String>>,
    notify: Notify,
}

impl Completions {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// A callback recording into these completions.
    pub fn callback(self: &Arc<Self>) -> impl Fn(&str) + Send + Sync + 'static {
        let this = Arc::clone(self);
        move |url: &str| {
            this.seen.lock().unwrap().push(url.to_owned());
            this.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls = self.seen.lock().unwrap().clone();
        urls.sort();
        urls
    }

    /// Waits until at least `n` callbacks have been recorded.
    pub async fn wait_for(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} callbacks, got {}", self.count()));
    }
}
