//! Counting limiter for outbound network work.
//!
//! Wraps a [`Semaphore`] and tracks how many operations are in flight and
//! the highest concurrency observed, so batch callers and tests can verify
//! the configured bound is honoured.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded-concurrency gate with in-flight accounting.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `permits` concurrent holders.
    ///
    /// A request for zero permits is clamped to one.
    pub fn new(permits: usize, label: &str) -> Self {
        let permits = permits.max(1);

        tracing::debug!(permits, label, "Created concurrency limiter");

        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a permit.
    ///
    /// Returns `None` only if the semaphore has been closed.
    pub async fn acquire(&self) -> Option<LimiterPermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Some(LimiterPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Returns the highest number of permits held at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// A held permit. Released when dropped, including during unwinding.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_permits_clamped_to_one() {
        let limiter = ConcurrencyLimiter::new(0, "test");
        assert_eq!(limiter.semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_permit_release_on_drop() {
        let limiter = ConcurrencyLimiter::new(2, "test");

        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.semaphore.available_permits(), 0);

        drop(a);
        assert_eq!(limiter.in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.semaphore.available_permits(), 1);

        drop(b);
        assert_eq!(limiter.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.peak_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_never_exceeds_permits() {
        let limiter = Arc::new(ConcurrencyLimiter::new(3, "test"));
        let mut handles = Vec::new();

        for _ in 0..12 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(limiter.peak_in_flight(), 3);
        assert_eq!(limiter.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permit_released_when_task_panics() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1, "test"));
        let l = Arc::clone(&limiter);

        let result = tokio::spawn(async move {
            let _permit = l.acquire().await.unwrap();
            panic!("boom");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(limiter.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.semaphore.available_permits(), 1);
    }
}
