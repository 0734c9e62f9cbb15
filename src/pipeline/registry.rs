use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::OverlapPolicy;
use crate::pipeline::storage::RunKey;

#[derive(Default)]
struct RegistryInner {
    active: Mutex<Vec<(u64, RunKey)>>,
    released: Notify,
    next_id: AtomicU64,
}

/// Runs currently in flight. Two runs whose keys overlap never execute at
/// the same time.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<RegistryInner>,
}

/// Held for the lifetime of a run; dropping it releases the key.
pub struct RunGuard {
    id: u64,
    inner: Arc<RegistryInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.inner.active.lock() {
            active.retain(|(id, _)| *id != self.id);
        }
        self.inner.released.notify_waiters();
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Register `key`. An overlapping active run either fails the call
    /// (`Reject`) or blocks it until that run finishes (`Wait`).
    pub async fn acquire(
        &self,
        key: &RunKey,
        policy: OverlapPolicy,
        cancel: &CancellationToken,
    ) -> Result<RunGuard, String> {
        loop {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            // register interest before checking so a release in between is not lost
            notified.as_mut().enable();

            {
                let mut active = self
                    .inner
                    .active
                    .lock()
                    .map_err(|_| "run registry lock poisoned".to_string())?;
                match active.iter().find(|(_, other)| other.overlaps(key)) {
                    None => {
                        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                        active.push((id, key.clone()));
                        debug!(key = %key, "Run registered");
                        return Ok(RunGuard {
                            id,
                            inner: Arc::clone(&self.inner),
                        });
                    }
                    Some((_, other)) if policy == OverlapPolicy::Reject => {
                        return Err(format!("run {} overlaps active run {}", key, other));
                    }
                    Some((_, other)) => {
                        info!(key = %key, active = %other, "Waiting for overlapping run to finish");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(format!("run {} cancelled while waiting for an overlapping run", key));
                }
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{City, DateRange};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn key(city: City) -> RunKey {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        RunKey::new([city].into_iter().collect(), DateRange::single(day))
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let registry = RunRegistry::new();
        let cancel = CancellationToken::new();
        let _first = registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await.unwrap();

        let second = registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await;
        assert!(second.is_err());
        assert!(registry.acquire(&key(City::Houston), OverlapPolicy::Reject, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_frees_the_key() {
        let registry = RunRegistry::new();
        let cancel = CancellationToken::new();
        let guard = registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await.unwrap();
        drop(guard);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_policy_blocks_until_release() {
        let registry = RunRegistry::new();
        let cancel = CancellationToken::new();
        let guard = registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                registry.acquire(&key(City::Seattle), OverlapPolicy::Wait, &cancel).await.is_ok()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let registry = RunRegistry::new();
        let cancel = CancellationToken::new();
        let _guard = registry.acquire(&key(City::Seattle), OverlapPolicy::Reject, &cancel).await.unwrap();

        cancel.cancel();
        let result = registry.acquire(&key(City::Seattle), OverlapPolicy::Wait, &cancel).await;
        assert!(result.is_err());
    }
}
