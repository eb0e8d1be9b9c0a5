use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;
use crate::error::StoreError;
use super::{Secret, SecretStore};

/// A stored secret and the moment it stops being visible.
struct Entry {
    secret: Secret,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline && !self.secret.is_empty()
    }
}

/// The moment an entry written at `now` with `ttl` expires.
fn deadline(now: Instant, ttl: Duration) -> Result<Instant, StoreError> {
    now.checked_add(ttl).ok_or_else(|| {
        StoreError::Protocol(format!("ttl of {:?} is out of range", ttl))
    })
}

/// An in-process SecretStore.
///
/// Expired entries are invisible immediately and reclaimed by
/// `purge_expired`.
#[derive(Default)]
pub struct MemoryStore {

    /// Secrets keyed by store key.
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {

    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry and return how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "purged expired secrets");
        }
        purged
    }

    /// Number of entries held, live or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SecretStore for MemoryStore {

    async fn get(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Secret>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(keys.iter()
            .filter_map(|key| {
                entries.get(key)
                    .filter(|entry| entry.is_live(now))
                    .map(|entry| (key.clone(), entry.secret.clone()))
            })
            .collect())
    }

    async fn put(
        &self,
        entries: HashMap<String, Secret>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let deadline = deadline(Instant::now(), ttl)?;
        let mut stored = self.entries.lock().await;
        for (key, secret) in entries {
            stored.insert(key, Entry { secret, deadline });
        }
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        secret: Secret,
        ttl: Duration,
    ) -> Result<Secret, StoreError> {
        let now = Instant::now();
        let renewed = deadline(now, ttl)?;
        // The lock is held across the check and the insert, so racing
        // callers serialize here and all but the first see its secret.
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_live(now) {
                entry.deadline = entry.deadline.max(renewed);
                return Ok(entry.secret.clone());
            }
        }
        entries.insert(key.to_owned(), Entry {
            secret: secret.clone(),
            deadline: renewed,
        });
        Ok(secret)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
