//! Lease store abstraction and an in-memory implementation.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::errors::Result;

/// Backend holding TTL-bounded leases, typically a shared cache.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Takes the lease for `holder` unless a live lease exists.
    ///
    /// Returns `true` when the lease was granted.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Releases the lease if `holder` still owns it.
    ///
    /// Returns `false` when the lease had expired or belongs to someone else.
    async fn release(&self, key: &str, holder: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct LeaseEntry {
    holder: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local lease store.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<String, LeaseEntry>,
}

impl InMemoryLeaseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a live lease exists for `key`.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.leases.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Returns the holder of a live lease.
    #[must_use]
    pub fn holder(&self, key: &str) -> Option<String> {
        self.leases
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.holder.clone())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let fresh = LeaseEntry {
            holder: holder.to_string(),
            expires_at: Instant::now() + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool> {
        Ok(self
            .leases
            .remove_if(key, |_, entry| entry.holder == holder && !entry.is_expired())
            .is_some())
    }
}
