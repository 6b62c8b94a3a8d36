//! The background loop that turns queued requests into fetches.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use sentry::{Hub, SentryFutureExt};

use crate::caching::{CacheEntry, IconError};
use crate::utils::futures::{catch_panic, panic_message};

use super::Shared;
use super::queue::LoadRequest;

/// Runs the dispatch loop until the manager is disposed.
///
/// The loop sleeps on the wake signal, then drains the request queue, spawning one fetch
/// task per request without waiting for it. Throttling happens inside the fetch tasks, so
/// draining never blocks on slow downloads.
pub(super) async fn run<T>(shared: Arc<Shared<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    tracing::debug!("Icon dispatch loop started");

    while !shared.is_disposed() {
        if !shared.wake.wait(shared.config.wake_timeout).await {
            tracing::trace!("Icon dispatch loop woke up without a signal");
        }

        while !shared.is_disposed() {
            let Some(request) = shared.queue.pop() else {
                break;
            };

            let url = request.url.clone();
            let dispatched = std::panic::catch_unwind(AssertUnwindSafe(|| {
                dispatch(&shared, request);
            }));
            if let Err(payload) = dispatched {
                metric!(counter("icons.dispatch.panic") += 1);
                tracing::error!(
                    %url,
                    panic = %panic_message(&*payload),
                    "Failed to dispatch icon request"
                );
            }
        }
    }

    tracing::debug!("Icon dispatch loop stopped");
}

fn dispatch<T>(shared: &Arc<Shared<T>>, request: LoadRequest)
where
    T: Clone + Send + Sync + 'static,
{
    tracing::trace!(url = %request.url, "Dispatching icon request");
    let task = process_request(Arc::clone(shared), request);
    tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())));
}

/// Loads a single requested icon and notifies the requester.
async fn process_request<T>(shared: Arc<Shared<T>>, request: LoadRequest)
where
    T: Clone + Send + Sync + 'static,
{
    let _in_flight = shared.track_in_flight();

    {
        let _slot = shared.throttle.acquire().await;

        // closing the throttle releases all waiters at once, none of them may fetch
        if shared.is_disposed() {
            tracing::trace!(url = %request.url, "Icon manager disposed, skipping fetch");
            return;
        }

        // another request for the same URL may have finished while we were waiting
        if shared.store.has(&request.url) {
            tracing::trace!(url = %request.url, "Icon already resolved, skipping fetch");
        } else {
            let entry = fetch_icon(&shared, &request.url).await;
            if !shared.store.put(&request.url, entry) {
                tracing::trace!(url = %request.url, "Icon was resolved concurrently");
            }
        }
    }

    if shared.is_disposed() {
        tracing::trace!(url = %request.url, "Icon manager disposed, suppressing callback");
        return;
    }
    request.complete();
}

/// Runs the icon source for `url`, turning every failure into a failed entry.
async fn fetch_icon<T>(shared: &Shared<T>, url: &str) -> CacheEntry<T>
where
    T: Clone + Send + Sync + 'static,
{
    let start = Instant::now();
    let entry = match catch_panic(shared.source.fetch(url)).await {
        Ok(entry) => entry,
        Err(message) => {
            tracing::error!(url, panic = %message, "Icon source panicked");
            Err(IconError::InternalError)
        }
    };
    metric!(timer("icons.fetch.duration") = start.elapsed());

    match &entry {
        Ok(_) => {
            metric!(counter("icons.fetch") += 1, "status" => "ok");
            tracing::debug!(url, "Icon loaded");
        }
        Err(error) => {
            metric!(counter("icons.fetch") += 1, "status" => error.metrics_tag());
            tracing::debug!(url, %error, "Icon failed to load");
        }
    }

    entry
}
