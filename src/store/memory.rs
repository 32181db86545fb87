//! In-process keyed store for development and tests.

use super::{Key, KeyStore, Namespace, Op, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Map = HashMap<(Namespace, String), Entry>;

/// A single mutex guards the whole map, which makes every trait call atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Map>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a Map, namespace: Namespace, key: &str) -> Option<&'a Entry> {
        entries
            .get(&(namespace, key.to_string()))
            .filter(|entry| entry.is_live(Instant::now()))
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(Self::live(&entries, namespace, key).map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert((namespace, key.to_string()), Entry::new(value, ttl));
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        if Self::live(&entries, namespace, key).is_some() {
            return Ok(false);
        }
        entries.insert((namespace, key.to_string()), Entry::new(value, ttl));
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        namespace: Namespace,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(&(namespace, key.to_string())) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                entry.value = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take(&self, keys: &[Key]) -> Result<Vec<Option<String>>, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .remove(&(key.namespace, key.key.clone()))
                    .filter(|entry| entry.is_live(now))
                    .map(|entry| entry.value)
            })
            .collect())
    }

    async fn apply(&self, ops: &[Op]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for op in ops {
            match op {
                Op::Set { key, value, ttl } => {
                    entries.insert((key.namespace, key.key.clone()), Entry::new(value, *ttl));
                }
                Op::Delete { key } => {
                    entries.remove(&(key.namespace, key.key.clone()));
                }
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
