//! Per-provider request pacing.

use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit wait cancelled")]
    Cancelled,
}

/// Token bucket with capacity one: a token becomes available every
/// `interval`. Each caller reserves the next free slot under a short lock
/// and sleeps outside it, so concurrent callers are spaced out without
/// blocking each other on the lock.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for a token. Returns `Cancelled` if the token fires first. A
    /// cancelled waiter hands its slot back when nobody has queued behind it.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };

        if slot <= Instant::now() {
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.release(slot);
                Err(RateLimitError::Cancelled)
            }
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }

    fn release(&self, slot: Instant) {
        let mut next = self.next_slot.lock().unwrap();
        if *next == slot + self.interval {
            *next = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_wait_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        limiter.wait(&cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_waits_are_spaced_by_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        for _ in 0..3 {
            limiter.wait(&cancel).await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40)));
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { limiter.wait(&cancel).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = limiter.wait(&cancel).await;
        assert_eq!(result, Err(RateLimitError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(limiter.wait(&cancel).await, Err(RateLimitError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_its_slot() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(300)));
        let started = std::time::Instant::now();
        limiter.wait(&CancellationToken::new()).await.unwrap();
        let reserved_before = *limiter.next_slot.lock().unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert_eq!(limiter.wait(&cancel).await, Err(RateLimitError::Cancelled));
        assert_eq!(*limiter.next_slot.lock().unwrap(), reserved_before);

        // The next caller takes the freed slot instead of queueing behind it
        limiter.wait(&CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_cancelled_wait_keeps_later_reservations() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(200)));
        limiter.wait(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let early = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.wait(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let late = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.wait(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let reserved = *limiter.next_slot.lock().unwrap();

        cancel.cancel();
        assert_eq!(early.await.unwrap(), Err(RateLimitError::Cancelled));
        assert_eq!(*limiter.next_slot.lock().unwrap(), reserved);
        late.await.unwrap().unwrap();
    }
}
