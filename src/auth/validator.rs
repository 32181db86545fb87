use super::AuthError;
use crate::store::{Guarded, Namespace};
use tracing::{debug, instrument};

/// Read-only answer to "is this access token live, and may it write".
///
/// An unknown or expired token is `Ok(false)`. Only infrastructure failures are
/// errors. Validation never extends a session.
#[derive(Clone, Debug)]
pub struct TokenValidator {
    store: Guarded,
}

impl TokenValidator {
    #[must_use]
    pub fn new(store: Guarded) -> Self {
        Self { store }
    }

    /// # Errors
    /// `Validation` for an empty token, otherwise `StoreUnavailable` or `Timeout`.
    #[instrument(skip_all, fields(write = require_write))]
    pub async fn validate(&self, access_token: &str, require_write: bool) -> Result<bool, AuthError> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(AuthError::validation("Missing token"));
        }

        if !self
            .store
            .contains(Namespace::AccessTokens, access_token)
            .await?
        {
            debug!("access token unknown or expired");
            return Ok(false);
        }

        if !require_write {
            return Ok(true);
        }

        let admin = self
            .store
            .get(Namespace::AccessAdmin, access_token)
            .await?
            .is_some_and(|flag| flag == "1");
        if !admin {
            debug!("access token lacks the admin flag");
        }
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyStore, MemoryStore, Op, StoreError};
    use async_trait::async_trait;
    use std::{sync::Arc, time::Duration};

    fn validator(backend: Arc<dyn KeyStore>) -> TokenValidator {
        TokenValidator::new(Guarded::new(
            backend,
            Duration::from_millis(50),
            Duration::from_millis(1),
        ))
    }

    #[tokio::test]
    async fn garbage_token_is_invalid_not_an_error() {
        let validator = validator(Arc::new(MemoryStore::new()));
        assert_eq!(validator.validate("garbage", false).await, Ok(false));
        assert_eq!(validator.validate("garbage", true).await, Ok(false));
        assert!(matches!(
            validator.validate(" ", false).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn write_requires_the_admin_flag() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .apply(&[
                Op::set(Namespace::AccessTokens, "111", "222"),
                Op::set(Namespace::AccessTokens, "333", "444"),
                Op::set(Namespace::AccessAdmin, "333", "1"),
            ])
            .await
            .unwrap();
        let validator = validator(backend);

        assert_eq!(validator.validate("111", false).await, Ok(true));
        assert_eq!(validator.validate("111", true).await, Ok(false));
        assert_eq!(validator.validate("333", true).await, Ok(true));
    }

    #[tokio::test]
    async fn expired_access_token_is_invalid() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .apply(&[Op::set_with_ttl(
                Namespace::AccessTokens,
                "111",
                "222",
                Some(Duration::from_millis(10)),
            )])
            .await
            .unwrap();
        let validator = validator(backend);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(validator.validate("111", false).await, Ok(false));
    }

    struct Down;

    #[async_trait]
    impl KeyStore for Down {
        async fn get(&self, _: Namespace, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn set(
            &self,
            _: Namespace,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn insert_if_absent(
            &self,
            _: Namespace,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn compare_and_set(
            &self,
            _: Namespace,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn take(&self, _: &[crate::store::Key]) -> Result<Vec<Option<String>>, StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn apply(&self, _: &[Op]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn purge_expired(&self) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("refused".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_is_an_error() {
        let validator = validator(Arc::new(Down));
        let result = validator.validate("111", false).await;
        assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
    }
}
