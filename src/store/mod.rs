//! Keyed store boundary.
//!
//! Every piece of state the service owns lives behind [`KeyStore`]: a namespaced
//! string-to-string map with optional per-key expiry. Multi-key mutations are
//! expressed as atomic primitives ([`KeyStore::take`], [`KeyStore::apply`]) so the
//! token rotation protocol never has to stitch together unguarded read-then-write
//! sequences.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{interval, sleep, timeout},
};
use tracing::{debug, error, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Logical key spaces. They share one backend but never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// email -> password hash
    Credentials,
    /// activation code -> "0" | "1"
    ActivationCodes,
    /// email -> activation code
    EmailActivation,
    /// access token -> refresh token
    AccessTokens,
    /// refresh token -> access token
    RefreshTokens,
    /// admin-eligibility set, email -> "1"
    AdminEmails,
    /// access token -> admin flag
    AccessAdmin,
    /// refresh token -> admin flag
    RefreshAdmin,
}

impl Namespace {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::ActivationCodes => "activation_codes",
            Self::EmailActivation => "email_activation",
            Self::AccessTokens => "access_tokens",
            Self::RefreshTokens => "refresh_tokens",
            Self::AdminEmails => "admin_emails",
            Self::AccessAdmin => "access_admin",
            Self::RefreshAdmin => "refresh_admin",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub namespace: Namespace,
    pub key: String,
}

impl Key {
    pub fn new(namespace: Namespace, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
        }
    }
}

/// A single mutation inside an atomic [`KeyStore::apply`] batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Set {
        key: Key,
        value: String,
        ttl: Option<Duration>,
    },
    Delete {
        key: Key,
    },
}

impl Op {
    pub fn set(namespace: Namespace, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: Key::new(namespace, key),
            value: value.into(),
            ttl: None,
        }
    }

    pub fn set_with_ttl(
        namespace: Namespace,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        Self::Set {
            key: Key::new(namespace, key),
            value: value.into(),
            ttl,
        }
    }

    pub fn delete(namespace: Namespace, key: impl Into<String>) -> Self {
        Self::Delete {
            key: Key::new(namespace, key),
        }
    }
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read a live value. Expired entries read as absent.
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Create the entry only if no live entry exists. Returns whether it was created.
    async fn insert_if_absent(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Replace `expected` with `new`. Returns false if the live value differs or is absent.
    async fn compare_and_set(
        &self,
        namespace: Namespace,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically read and delete every key. Of two concurrent takes of the same
    /// key at most one observes its value.
    async fn take(&self, keys: &[Key]) -> Result<Vec<Option<String>>, StoreError>;

    /// Apply all operations atomically, in order.
    async fn apply(&self, ops: &[Op]) -> Result<(), StoreError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Bounded-time access to a [`KeyStore`].
///
/// Every call is capped by `timeout`. Idempotent calls (`get`, `set`, `apply`,
/// `ping`) are retried once after `backoff` when they fail with an
/// infrastructure error; calls whose effect depends on the current value are not.
#[derive(Clone)]
pub struct Guarded {
    inner: Arc<dyn KeyStore>,
    timeout: Duration,
    backoff: Duration,
}

impl Guarded {
    #[must_use]
    pub fn new(inner: Arc<dyn KeyStore>, timeout: Duration, backoff: Duration) -> Self {
        Self {
            inner,
            timeout,
            backoff,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn retried<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match self.bounded(call()).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!("store {operation} failed, retrying once: {err}");
                sleep(self.backoff).await;
                self.bounded(call()).await
            }
        }
    }

    pub async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.as_ref();
        self.retried("get", || inner.get(namespace, key)).await
    }

    pub async fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    pub async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let inner = self.inner.as_ref();
        self.retried("set", || inner.set(namespace, key, value, ttl))
            .await
    }

    pub async fn insert_if_absent(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.insert_if_absent(namespace, key, value, ttl))
            .await
    }

    pub async fn compare_and_set(
        &self,
        namespace: Namespace,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.compare_and_set(namespace, key, expected, new))
            .await
    }

    pub async fn take(&self, keys: &[Key]) -> Result<Vec<Option<String>>, StoreError> {
        self.bounded(self.inner.take(keys)).await
    }

    pub async fn apply(&self, ops: &[Op]) -> Result<(), StoreError> {
        let inner = self.inner.as_ref();
        self.retried("apply", || inner.apply(ops)).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let inner = self.inner.as_ref();
        self.retried("ping", || inner.ping()).await
    }
}

impl fmt::Debug for Guarded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Periodically drop expired keys so the backend does not grow without bound.
pub fn spawn_sweeper(store: Arc<dyn KeyStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(if every.is_zero() {
            Duration::from_secs(1)
        } else {
            every
        });

        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => (),
                Ok(purged) => debug!("purged {purged} expired keys"),
                Err(err) => error!("failed to purge expired keys: {err}"),
            }
        }
    })
}
