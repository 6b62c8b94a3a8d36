use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

/// A soft limit on the number of concurrently running icon fetches.
///
/// Waiting for a slot is bounded by a timeout. When it elapses, or once the throttle is
/// closed, the fetch proceeds without a slot instead of being dropped.
#[derive(Debug)]
pub struct Throttle {
    semaphore: Semaphore,
    capacity: usize,
    timeout: Duration,
}

/// A slot acquired from a [`Throttle`], released when dropped.
///
/// A slot without a permit was handed out after the wait timed out or the throttle was closed.
#[derive(Debug)]
pub struct ThrottleSlot<'a> {
    permit: Option<SemaphorePermit<'a>>,
}

impl ThrottleSlot<'_> {
    /// Whether this slot counts against the throttle's capacity.
    pub fn is_acquired(&self) -> bool {
        self.permit.is_some()
    }
}

impl Throttle {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot, for at most the configured timeout.
    pub async fn acquire(&self) -> ThrottleSlot<'_> {
        let permit = match tokio::time::timeout(self.timeout, self.semaphore.acquire()).await {
            Ok(Ok(permit)) => Some(permit),
            // closed during disposal, let the remaining work drain
            Ok(Err(_)) => None,
            Err(_) => {
                metric!(counter("icons.throttle.timeout") += 1);
                tracing::debug!(
                    timeout = ?self.timeout,
                    "Timed out waiting for a throttle slot, proceeding anyway"
                );
                None
            }
        };
        ThrottleSlot { permit }
    }

    /// Closes the throttle, waking all waiters.
    ///
    /// All current and future [`acquire`](Self::acquire) calls return immediately. Closing
    /// twice is harmless.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_capacity() {
        let throttle = Throttle::new(2, Duration::from_secs(5));
        assert_eq!(throttle.available(), 2);

        let first = throttle.acquire().await;
        let second = throttle.acquire().await;
        assert!(first.is_acquired());
        assert!(second.is_acquired());
        assert_eq!(throttle.available(), 0);

        drop(first);
        assert_eq!(throttle.available(), 1);
        drop(second);
        assert_eq!(throttle.available(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_one() {
        let throttle = Throttle::new(0, Duration::from_secs(5));
        assert_eq!(throttle.capacity(), 1);
        assert!(throttle.acquire().await.is_acquired());
    }

    #[tokio::test]
    async fn test_timeout_proceeds() {
        let throttle = Throttle::new(1, Duration::from_millis(20));
        let held = throttle.acquire().await;
        assert!(held.is_acquired());

        let forced = throttle.acquire().await;
        assert!(!forced.is_acquired());

        // a forced slot does not give anything back when dropped
        drop(forced);
        assert_eq!(throttle.available(), 0);
        drop(held);
        assert_eq!(throttle.available(), 1);
    }

    #[tokio::test]
    async fn test_waiter_gets_released_slot() {
        let throttle = Arc::new(Throttle::new(1, Duration::from_secs(5)));
        let held = throttle.acquire().await;

        let waiter = {
            let throttle = Arc::clone(&throttle);
            tokio::spawn(async move { throttle.acquire().await.is_acquired() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let throttle = Arc::new(Throttle::new(1, Duration::from_secs(60)));
        let held = throttle.acquire().await;

        let waiter = {
            let throttle = Arc::clone(&throttle);
            tokio::spawn(async move { throttle.acquire().await.is_acquired() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        throttle.close();
        throttle.close();

        assert!(!waiter.await.unwrap());
        assert!(throttle.is_closed());
        assert!(!throttle.acquire().await.is_acquired());

        // releasing a permit into a closed throttle is fine
        drop(held);
    }
}
