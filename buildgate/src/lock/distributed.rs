//! Lock handles and scoped lease guards.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::LeaseStore;
use crate::errors::{BuildError, Result};

/// Configuration of a single lock class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Time-to-live of the lease in milliseconds.
    pub ttl_ms: u64,
    /// Maximum time to wait in [`DistributedLock::acquire`].
    pub acquire_timeout_ms: u64,
    /// Initial backoff between attempts in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff between attempts in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            acquire_timeout_ms: 10_000,
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
        }
    }
}

impl LockConfig {
    /// Creates a config with the given TTL and default waiting behaviour.
    #[must_use]
    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            ..Self::default()
        }
    }

    /// Sets the acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// A named lock over a [`LeaseStore`].
pub struct DistributedLock {
    store: Arc<dyn LeaseStore>,
    key: String,
    holder_id: String,
    config: LockConfig,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("holder_id", &self.holder_id)
            .field("config", &self.config)
            .finish()
    }
}

impl DistributedLock {
    /// Creates a lock handle with a fresh holder id.
    pub fn new(store: Arc<dyn LeaseStore>, key: impl Into<String>, config: LockConfig) -> Self {
        Self {
            store,
            key: key.into(),
            holder_id: Uuid::new_v4().to_string(),
            config,
        }
    }

    /// The lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tries once; `None` when the lease is held by someone else.
    pub async fn try_acquire(&self) -> Result<Option<LeaseGuard>> {
        let granted = self
            .store
            .try_acquire(&self.key, &self.holder_id, self.config.ttl())
            .await?;

        if granted {
            debug!(key = %self.key, holder = %self.holder_id, ttl_ms = self.config.ttl_ms, "lease acquired");
            Ok(Some(self.guard()))
        } else {
            Ok(None)
        }
    }

    /// Waits for the lease with exponential backoff and jitter.
    ///
    /// Fails with [`BuildError::LockTimeout`] once the acquire timeout has
    /// elapsed; nothing is held in that case.
    pub async fn acquire(&self) -> Result<LeaseGuard> {
        let deadline = Instant::now() + Duration::from_millis(self.config.acquire_timeout_ms);
        let mut backoff_ms = self.config.initial_backoff_ms.max(1);

        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(key = %self.key, timeout_ms = self.config.acquire_timeout_ms, "lease acquisition timed out");
                return Err(BuildError::LockTimeout {
                    key: self.key.clone(),
                    timeout_ms: self.config.acquire_timeout_ms,
                });
            }

            let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 2);
            let sleep = Duration::from_millis(backoff_ms + jitter).min(deadline - now);

            debug!(key = %self.key, backoff_ms = sleep.as_millis() as u64, "lease held, backing off");
            tokio::time::sleep(sleep).await;

            backoff_ms = (backoff_ms * 2).min(self.config.max_backoff_ms.max(1));
        }
    }

    fn guard(&self) -> LeaseGuard {
        LeaseGuard {
            store: self.store.clone(),
            key: self.key.clone(),
            holder_id: self.holder_id.clone(),
            released: false,
        }
    }
}

/// A held lease.
///
/// Callers release it with [`LeaseGuard::release`] on every exit path. If
/// the guard is dropped without that (panic, cancelled future) the release
/// is spawned onto the current runtime; without a runtime the lease
/// expires through its TTL.
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    key: String,
    holder_id: String,
    released: bool,
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("holder_id", &self.holder_id)
            .field("released", &self.released)
            .finish()
    }
}

impl LeaseGuard {
    /// The lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The holder id.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Releases the lease. Failures are logged; the TTL bounds the damage.
    pub async fn release(mut self) {
        self.released = true;
        match self.store.release(&self.key, &self.holder_id).await {
            Ok(true) => debug!(key = %self.key, "lease released"),
            Ok(false) => warn!(key = %self.key, "lease release skipped: already expired or taken"),
            Err(e) => warn!(key = %self.key, error = %e, "lease release failed, will expire via TTL"),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.release(&key, &holder).await {
                        Ok(_) => debug!(key = %key, "lease released on drop"),
                        Err(e) => debug!(key = %key, error = %e, "lease release on drop failed"),
                    }
                });
            }
            Err(_) => debug!(key = %key, "no runtime to release lease, will expire via TTL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::InMemoryLeaseStore;

    fn store() -> Arc<InMemoryLeaseStore> {
        Arc::new(InMemoryLeaseStore::new())
    }

    #[tokio::test]
    async fn test_try_acquire_contention() {
        let store = store();
        let first = DistributedLock::new(store.clone(), "k", LockConfig::default());
        let second = DistributedLock::new(store.clone(), "k", LockConfig::default());

        let guard = first.try_acquire().await.unwrap().expect("first holder");
        assert!(second.try_acquire().await.unwrap().is_none());

        guard.release().await;
        assert!(second.try_acquire().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_times_out_without_side_effect() {
        let store = store();
        let holder = DistributedLock::new(store.clone(), "k", LockConfig::default());
        let _held = holder.try_acquire().await.unwrap().unwrap();

        let waiter = DistributedLock::new(
            store.clone(),
            "k",
            LockConfig::default().with_acquire_timeout_ms(50),
        );
        let err = waiter.acquire().await.unwrap_err();

        assert!(matches!(err, BuildError::LockTimeout { timeout_ms: 50, .. }));
        assert_eq!(store.holder("k").as_deref(), Some(holder.holder_id.as_str()));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let store = store();
        let holder = DistributedLock::new(store.clone(), "k", LockConfig::default());
        let guard = holder.try_acquire().await.unwrap().unwrap();

        let waiter = DistributedLock::new(store.clone(), "k", LockConfig::default());
        let wait = tokio::spawn(async move { waiter.acquire().await.map(|g| g.holder_id().to_string()) });

        tokio::time::sleep(Duration::from_millis(30)).await;
        guard.release().await;

        let new_holder = wait.await.unwrap().unwrap();
        assert_ne!(new_holder, holder.holder_id);
    }

    #[tokio::test]
    async fn test_drop_releases_lease() {
        let store = store();
        let lock = DistributedLock::new(store.clone(), "k", LockConfig::default());
        {
            let _guard = lock.try_acquire().await.unwrap().unwrap();
        }

        // Release on drop runs as a spawned task.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.is_held("k"));
    }
}
