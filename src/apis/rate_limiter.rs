use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::app::ports::DelayPort;

/// Enforces a minimum interval between consecutive requests of one client.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait (through `delay`) until the next request may be sent.
    pub async fn acquire(&self, delay: &dyn DelayPort) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                delay.sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingDelay(StdMutex<Vec<Duration>>);

    #[async_trait]
    impl DelayPort for RecordingDelay {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_first_request_is_not_delayed() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let delay = RecordingDelay::default();
        limiter.acquire(&delay).await;
        assert!(delay.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_requests_wait_for_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let delay = RecordingDelay::default();
        limiter.acquire(&delay).await;
        limiter.acquire(&delay).await;

        let waits = delay.0.lock().unwrap();
        assert_eq!(waits.len(), 1);
        assert!(waits[0] > Duration::ZERO && waits[0] <= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let delay = RecordingDelay::default();
        for _ in 0..3 {
            limiter.acquire(&delay).await;
        }
        assert!(delay.0.lock().unwrap().is_empty());
    }
}
