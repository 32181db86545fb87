//! Registration and activation-link handling.

use super::{
    utils::{checked_email, generate_code},
    AuthConfig, AuthError, Passwords,
};
use crate::{
    notify::Notifier,
    store::{Guarded, Namespace, Op},
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

const UNUSED: &str = "0";
const USED: &str = "1";

/// Sole writer of credentials and activation links.
#[derive(Clone)]
pub struct AccountManager {
    store: Guarded,
    notifier: Arc<dyn Notifier>,
    passwords: Passwords,
    config: AuthConfig,
}

impl AccountManager {
    #[must_use]
    pub fn new(
        store: Guarded,
        notifier: Arc<dyn Notifier>,
        passwords: Passwords,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            passwords,
            config,
        }
    }

    /// Create an account and queue its activation link.
    ///
    /// The account is written before the link is published. A publish failure
    /// is reported as `NotificationFailed` and leaves the account in place.
    /// # Errors
    /// `Validation`, `AlreadyExists`, store failures or `NotificationFailed`.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = checked_email(email)?;
        if password.is_empty() {
            return Err(AuthError::validation("Missing password"));
        }

        let hash = self.passwords.hash(password).await?;

        if !self
            .store
            .insert_if_absent(Namespace::Credentials, &email, &hash, None)
            .await?
        {
            debug!("email already registered");
            return Err(AuthError::AlreadyExists);
        }

        let code = generate_code();
        let link_ops = [
            Op::set(Namespace::ActivationCodes, code.as_str(), UNUSED),
            Op::set(Namespace::EmailActivation, email.as_str(), code.as_str()),
        ];
        if let Err(err) = self.store.apply(&link_ops).await {
            // Without a link the account could never be activated, so free the email.
            if let Err(cleanup) = self
                .store
                .apply(&[Op::delete(Namespace::Credentials, email.as_str())])
                .await
            {
                error!("failed to release credentials after link write failure: {cleanup}");
            }
            return Err(err.into());
        }

        let link = self.config.activation_link(&code);
        if let Err(err) = self.notifier.publish(&link).await {
            warn!("activation link not queued: {err}");
            return Err(AuthError::NotificationFailed(err.to_string()));
        }

        debug!("account registered, activation link queued");
        Ok(())
    }

    /// Mark an activation link as used. A second activation is rejected.
    /// # Errors
    /// `Validation`, `NotFound`, `AlreadyUsed` or store failures.
    #[instrument(skip(self))]
    pub async fn activate(&self, code: &str) -> Result<(), AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::validation("Missing activation code"));
        }

        if self
            .store
            .compare_and_set(Namespace::ActivationCodes, code, UNUSED, USED)
            .await?
        {
            debug!("activation link used");
            return Ok(());
        }

        match self.store.get(Namespace::ActivationCodes, code).await? {
            Some(_) => Err(AuthError::AlreadyUsed),
            None => Err(AuthError::NotFound),
        }
    }

    /// Whether the account behind `email` has clicked its activation link.
    pub(crate) async fn is_activated(&self, email: &str) -> Result<bool, AuthError> {
        let Some(code) = self.store.get(Namespace::EmailActivation, email).await? else {
            return Err(AuthError::NotRegistered);
        };

        match self.store.get(Namespace::ActivationCodes, &code).await? {
            Some(flag) => Ok(flag == USED),
            None => Err(AuthError::NotFound),
        }
    }

    pub(crate) async fn password_matches(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        let Some(hash) = self.store.get(Namespace::Credentials, email).await? else {
            return Err(AuthError::NotFound);
        };
        self.passwords.verify(password, &hash).await
    }
}
