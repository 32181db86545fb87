//! Login, token rotation and logout.
//!
//! A token pair is four directional entries: `access -> refresh` (expires with
//! the access token), `refresh -> access` (no expiry), and when the pair was
//! issued to an admin, an admin flag keyed by each token. The admin flag is
//! fixed when the pair is minted and is carried across rotations; promoting an
//! account only affects pairs minted afterwards.
//!
//! Rotation claims the old refresh side with an atomic take, so of two
//! concurrent rotations of the same refresh token exactly one proceeds. The
//! admin flag is read by that same take. The old access side is then removed
//! in the same atomic batch that writes the new pair, so the old and new
//! access tokens are never valid at the same time.

use super::{
    utils::{checked_email, generate_code},
    AccountManager, AuthConfig, AuthError,
};
use crate::store::{Guarded, Key, Namespace, Op};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

const ADMIN_FLAG: &str = "1";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    fn generate() -> Self {
        Self {
            access_token: generate_code(),
            refresh_token: generate_code(),
        }
    }

    /// Entries that make this pair live.
    fn writes(&self, admin: bool, access_ttl: Option<Duration>) -> Vec<Op> {
        let mut ops = vec![
            Op::set(
                Namespace::RefreshTokens,
                self.refresh_token.as_str(),
                self.access_token.as_str(),
            ),
            Op::set_with_ttl(
                Namespace::AccessTokens,
                self.access_token.as_str(),
                self.refresh_token.as_str(),
                access_ttl,
            ),
        ];
        if admin {
            ops.push(Op::set_with_ttl(
                Namespace::AccessAdmin,
                self.access_token.as_str(),
                ADMIN_FLAG,
                access_ttl,
            ));
            ops.push(Op::set(
                Namespace::RefreshAdmin,
                self.refresh_token.as_str(),
                ADMIN_FLAG,
            ));
        }
        ops
    }

    /// Entries to remove so that this pair no longer validates or rotates.
    fn deletes(&self) -> [Op; 4] {
        [
            Op::delete(Namespace::AccessTokens, self.access_token.as_str()),
            Op::delete(Namespace::AccessAdmin, self.access_token.as_str()),
            Op::delete(Namespace::RefreshTokens, self.refresh_token.as_str()),
            Op::delete(Namespace::RefreshAdmin, self.refresh_token.as_str()),
        ]
    }
}

/// Refresh side of a pair, removed in one atomic take.
struct Claimed {
    access_token: String,
    was_admin: bool,
}

/// Sole writer of token pairs and their admin flags.
#[derive(Clone)]
pub struct SessionManager {
    store: Guarded,
    accounts: AccountManager,
    config: AuthConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Guarded, accounts: AccountManager, config: AuthConfig) -> Self {
        Self {
            store,
            accounts,
            config,
        }
    }

    /// Authenticate with email and password and mint a new token pair.
    /// # Errors
    /// `Validation`, `NotRegistered`, `NotActivated`, `NotFound`,
    /// `WrongPassword` or store failures.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = checked_email(email)?;
        if password.is_empty() {
            return Err(AuthError::validation("Missing password"));
        }

        if !self.accounts.is_activated(&email).await? {
            debug!("login before activation");
            return Err(AuthError::NotActivated);
        }

        if !self.accounts.password_matches(&email, password).await? {
            debug!("wrong password");
            return Err(AuthError::WrongPassword);
        }

        let admin = self.store.contains(Namespace::AdminEmails, &email).await?;
        let pair = TokenPair::generate();
        self.store
            .apply(&pair.writes(admin, Some(self.config.access_token_ttl())))
            .await?;

        debug!(admin, "token pair issued");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh pair, retiring the old one.
    ///
    /// If writing the new pair fails, `RotationIncomplete` is returned. A failed
    /// write may still have committed, so the new pair is deleted in the same
    /// batch that puts the old refresh side back; the old refresh token can
    /// then be retried and the unreturned pair never validates.
    /// # Errors
    /// `Validation`, `InvalidRefreshToken`, `RotationIncomplete` or store failures.
    #[instrument(skip_all)]
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let refresh_token = refresh_token.trim();
        let claimed = self.claim(refresh_token).await?;

        let pair = TokenPair::generate();
        let mut ops = vec![
            Op::delete(Namespace::AccessTokens, claimed.access_token.as_str()),
            Op::delete(Namespace::AccessAdmin, claimed.access_token.as_str()),
        ];
        ops.extend(pair.writes(
            claimed.was_admin,
            Some(self.config.access_token_ttl()),
        ));

        if let Err(err) = self.store.apply(&ops).await {
            error!("failed to write rotated token pair: {err}");
            self.restore(refresh_token, &claimed, &pair).await;
            return Err(AuthError::RotationIncomplete);
        }

        debug!(admin = claimed.was_admin, "token pair rotated");
        Ok(pair)
    }

    /// Revoke the pair behind a refresh token.
    /// # Errors
    /// `Validation`, `InvalidRefreshToken` or store failures.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claimed = self.claim(refresh_token.trim()).await?;

        self.store
            .apply(&[
                Op::delete(Namespace::AccessTokens, claimed.access_token.as_str()),
                Op::delete(Namespace::AccessAdmin, claimed.access_token.as_str()),
            ])
            .await?;

        debug!("token pair revoked");
        Ok(())
    }

    /// Install a fixed, non-expiring admin pair. Used to bootstrap the first administrator.
    /// # Errors
    /// `Validation` or store failures.
    pub async fn seed_admin_pair(&self, pair: &TokenPair) -> Result<(), AuthError> {
        if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
            return Err(AuthError::validation("Bootstrap tokens must not be empty"));
        }
        self.store.apply(&pair.writes(true, None)).await?;
        Ok(())
    }

    async fn claim(&self, refresh_token: &str) -> Result<Claimed, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::validation("Missing refresh_token"));
        }

        let taken = self
            .store
            .take(&[
                Key::new(Namespace::RefreshTokens, refresh_token),
                Key::new(Namespace::RefreshAdmin, refresh_token),
            ])
            .await?;

        let mut taken = taken.into_iter();
        let access_token = taken.next().flatten();
        let was_admin = taken.next().flatten().is_some_and(|flag| flag == ADMIN_FLAG);

        match access_token {
            Some(access_token) => Ok(Claimed {
                access_token,
                was_admin,
            }),
            None => {
                debug!("refresh token unknown or already rotated");
                Err(AuthError::InvalidRefreshToken)
            }
        }
    }

    async fn restore(&self, refresh_token: &str, claimed: &Claimed, orphan: &TokenPair) {
        let mut ops = orphan.deletes().to_vec();
        ops.push(Op::set(
            Namespace::RefreshTokens,
            refresh_token,
            claimed.access_token.as_str(),
        ));
        if claimed.was_admin {
            ops.push(Op::set(Namespace::RefreshAdmin, refresh_token, ADMIN_FLAG));
        }

        match self.store.apply(&ops).await {
            Ok(()) => warn!("rotation rolled back, refresh token may be retried"),
            Err(err) => error!("failed to restore refresh token after rotation failure: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{password::fast_params, Passwords, TokenValidator},
        notify::ChannelNotifier,
        store::{KeyStore, MemoryStore, StoreError},
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        accounts: AccountManager,
        sessions: SessionManager,
        validator: TokenValidator,
        backend: Arc<MemoryStore>,
        queue: crate::notify::ActivationQueue,
    }

    fn fixture_with(backend: Arc<dyn KeyStore>, memory: Arc<MemoryStore>) -> Fixture {
        let store = Guarded::new(backend, Duration::from_secs(1), Duration::from_millis(1));
        let (notifier, queue) = ChannelNotifier::channel();
        let config = AuthConfig::default();
        let accounts = AccountManager::new(
            store.clone(),
            Arc::new(notifier),
            Passwords::new(fast_params()),
            config.clone(),
        );
        Fixture {
            sessions: SessionManager::new(store.clone(), accounts.clone(), config),
            validator: TokenValidator::new(store),
            accounts,
            backend: memory,
            queue,
        }
    }

    fn fixture() -> Fixture {
        let memory = Arc::new(MemoryStore::new());
        fixture_with(memory.clone(), memory)
    }

    async fn activated(f: &mut Fixture, email: &str, password: &str) {
        f.accounts.register(email, password).await.unwrap();
        let link = f.queue.try_recv().unwrap();
        let code = link.rsplit('/').next().unwrap().to_string();
        f.accounts.activate(&code).await.unwrap();
    }

    #[tokio::test]
    async fn login_before_activation_is_rejected() {
        let f = fixture();
        f.accounts.register("alice@x.com", "pw1").await.unwrap();
        assert_eq!(
            f.sessions.login("alice@x.com", "pw1").await,
            Err(AuthError::NotActivated)
        );
    }

    #[tokio::test]
    async fn login_of_unknown_email_is_not_registered() {
        let f = fixture();
        assert_eq!(
            f.sessions.login("bob@x.com", "pw").await,
            Err(AuthError::NotRegistered)
        );
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        assert_eq!(
            f.sessions.login("alice@x.com", "pw2").await,
            Err(AuthError::WrongPassword)
        );
    }

    #[tokio::test]
    async fn login_writes_mutually_referencing_entries() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        let pair = f.sessions.login("alice@x.com", "pw1").await.unwrap();

        assert_eq!(
            f.backend
                .get(Namespace::AccessTokens, &pair.access_token)
                .await
                .unwrap(),
            Some(pair.refresh_token.clone())
        );
        assert_eq!(
            f.backend
                .get(Namespace::RefreshTokens, &pair.refresh_token)
                .await
                .unwrap(),
            Some(pair.access_token.clone())
        );
        assert_eq!(
            f.backend
                .get(Namespace::AccessAdmin, &pair.access_token)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn concurrent_logins_yield_independent_pairs() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        let (first, second) = tokio::join!(
            f.sessions.login("alice@x.com", "pw1"),
            f.sessions.login("alice@x.com", "pw1")
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);
        assert!(f.validator.validate(&first.access_token, false).await.unwrap());
        assert!(f.validator.validate(&second.access_token, false).await.unwrap());
    }

    #[tokio::test]
    async fn rotation_retires_the_old_pair() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        let old = f.sessions.login("alice@x.com", "pw1").await.unwrap();

        let new = f.sessions.rotate(&old.refresh_token).await.unwrap();
        assert_ne!(old, new);
        assert!(!f.validator.validate(&old.access_token, false).await.unwrap());
        assert!(f.validator.validate(&new.access_token, false).await.unwrap());
        assert_eq!(
            f.sessions.rotate(&old.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn rotation_carries_the_admin_flag() {
        let mut f = fixture();
        activated(&mut f, "root@x.com", "pw").await;
        f.backend
            .set(Namespace::AdminEmails, "root@x.com", "1", None)
            .await
            .unwrap();

        let pair = f.sessions.login("root@x.com", "pw").await.unwrap();
        assert!(f.validator.validate(&pair.access_token, true).await.unwrap());

        // Revoking eligibility does not touch pairs already issued.
        f.backend
            .apply(&[Op::delete(Namespace::AdminEmails, "root@x.com")])
            .await
            .unwrap();
        let rotated = f.sessions.rotate(&pair.refresh_token).await.unwrap();
        assert!(f.validator.validate(&rotated.access_token, true).await.unwrap());
        assert!(!f.validator.validate(&pair.access_token, true).await.unwrap());
        assert_eq!(
            f.backend
                .get(Namespace::RefreshAdmin, &pair.refresh_token)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn concurrent_rotations_have_one_winner() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        let pair = f.sessions.login("alice@x.com", "pw1").await.unwrap();

        let (a, b) = tokio::join!(
            f.sessions.rotate(&pair.refresh_token),
            f.sessions.rotate(&pair.refresh_token)
        );
        let results = [a, b];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .any(|r| r == &Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn logout_revokes_both_tokens() {
        let mut f = fixture();
        activated(&mut f, "alice@x.com", "pw1").await;
        let pair = f.sessions.login("alice@x.com", "pw1").await.unwrap();

        f.sessions.logout(&pair.refresh_token).await.unwrap();
        assert!(!f.validator.validate(&pair.access_token, false).await.unwrap());
        assert_eq!(
            f.sessions.rotate(&pair.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        );
        assert_eq!(
            f.sessions.logout(&pair.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        );
    }

    #[tokio::test]
    async fn empty_refresh_token_is_a_validation_error() {
        let f = fixture();
        assert!(matches!(
            f.sessions.rotate("  ").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn seeded_admin_pair_validates_for_writes() {
        let f = fixture();
        let pair = TokenPair {
            access_token: "root".to_string(),
            refresh_token: "toor".to_string(),
        };
        f.sessions.seed_admin_pair(&pair).await.unwrap();
        assert!(f.validator.validate("root", true).await.unwrap());
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum WriteFault {
        None,
        /// The rotation batch is refused before anything is written.
        Refuse,
        /// The rotation batch commits but the caller sees a timeout.
        LoseAck,
    }

    /// Delegates to a memory store, injecting faults into the batch that
    /// writes a rotated pair. Compensating batches are let through.
    struct FaultyWrites {
        inner: Arc<MemoryStore>,
        fault: Mutex<WriteFault>,
        rotation_batch: Mutex<Vec<Op>>,
    }

    impl FaultyWrites {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                fault: Mutex::new(WriteFault::None),
                rotation_batch: Mutex::new(Vec::new()),
            }
        }

        fn inject(&self, fault: WriteFault) {
            *self.fault.lock().unwrap() = fault;
        }

        /// Pair written by the last faulted rotation batch.
        fn orphan(&self) -> TokenPair {
            let batch = self.rotation_batch.lock().unwrap();
            let (access_token, refresh_token) = batch
                .iter()
                .find_map(|op| match op {
                    Op::Set { key, value, .. } if key.namespace == Namespace::AccessTokens => {
                        Some((key.key.clone(), value.clone()))
                    }
                    _ => None,
                })
                .unwrap();
            TokenPair {
                access_token,
                refresh_token,
            }
        }
    }

    fn writes_access_token(ops: &[Op]) -> bool {
        ops.iter().any(|op| {
            matches!(op, Op::Set { key, .. } if key.namespace == Namespace::AccessTokens)
        })
    }

    #[async_trait]
    impl KeyStore for FaultyWrites {
        async fn get(&self, ns: Namespace, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(ns, key).await
        }

        async fn set(
            &self,
            ns: Namespace,
            key: &str,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.inner.set(ns, key, value, ttl).await
        }

        async fn insert_if_absent(
            &self,
            ns: Namespace,
            key: &str,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<bool, StoreError> {
            self.inner.insert_if_absent(ns, key, value, ttl).await
        }

        async fn compare_and_set(
            &self,
            ns: Namespace,
            key: &str,
            expected: &str,
            new: &str,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_set(ns, key, expected, new).await
        }

        async fn take(&self, keys: &[Key]) -> Result<Vec<Option<String>>, StoreError> {
            self.inner.take(keys).await
        }

        async fn apply(&self, ops: &[Op]) -> Result<(), StoreError> {
            let fault = *self.fault.lock().unwrap();
            if fault == WriteFault::None || !writes_access_token(ops) {
                return self.inner.apply(ops).await;
            }

            *self.rotation_batch.lock().unwrap() = ops.to_vec();
            match fault {
                WriteFault::Refuse => Err(StoreError::Unavailable("connection reset".to_string())),
                _ => {
                    self.inner.apply(ops).await?;
                    Err(StoreError::Timeout)
                }
            }
        }

        async fn purge_expired(&self) -> Result<u64, StoreError> {
            self.inner.purge_expired().await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    async fn faulty_fixture() -> (Fixture, Arc<FaultyWrites>, TokenPair) {
        let memory = Arc::new(MemoryStore::new());
        let faulty = Arc::new(FaultyWrites::new(memory.clone()));
        let mut f = fixture_with(faulty.clone(), memory);
        activated(&mut f, "alice@x.com", "pw1").await;
        let pair = f.sessions.login("alice@x.com", "pw1").await.unwrap();
        (f, faulty, pair)
    }

    #[tokio::test]
    async fn failed_rotation_is_reported_and_can_be_retried() {
        let (f, faulty, pair) = faulty_fixture().await;

        faulty.inject(WriteFault::Refuse);
        let result = f.sessions.rotate(&pair.refresh_token).await;
        assert_eq!(result, Err(AuthError::RotationIncomplete));
        assert!(result.is_err_and(|err| err.is_retryable()));

        // Nothing was written, the old pair is still intact.
        assert!(f.validator.validate(&pair.access_token, false).await.unwrap());

        faulty.inject(WriteFault::None);
        let rotated = f.sessions.rotate(&pair.refresh_token).await.unwrap();
        assert!(!f.validator.validate(&pair.access_token, false).await.unwrap());
        assert!(f.validator.validate(&rotated.access_token, false).await.unwrap());
    }

    #[tokio::test]
    async fn committed_but_unacknowledged_rotation_leaves_one_lineage() {
        let (f, faulty, pair) = faulty_fixture().await;

        faulty.inject(WriteFault::LoseAck);
        assert_eq!(
            f.sessions.rotate(&pair.refresh_token).await,
            Err(AuthError::RotationIncomplete)
        );
        faulty.inject(WriteFault::None);

        // The pair nobody received is gone.
        let orphan = faulty.orphan();
        assert_ne!(orphan, pair);
        assert!(!f.validator.validate(&orphan.access_token, false).await.unwrap());
        assert_eq!(
            f.sessions.rotate(&orphan.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        );

        let rotated = f.sessions.rotate(&pair.refresh_token).await.unwrap();
        assert!(f.validator.validate(&rotated.access_token, false).await.unwrap());
        assert!(!f.validator.validate(&pair.access_token, false).await.unwrap());
        assert!(!f.validator.validate(&orphan.access_token, false).await.unwrap());
    }
}
