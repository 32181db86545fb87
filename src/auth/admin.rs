use super::{utils::checked_email, AuthError, TokenValidator};
use crate::store::{Guarded, Namespace};
use tracing::{debug, info, instrument};

/// Sole writer of the admin-eligibility set.
///
/// Eligibility only decides whether pairs minted by a later login receive the
/// admin flag. Pairs already issued to the promoted email keep whatever flag
/// they were minted with.
#[derive(Clone, Debug)]
pub struct AdminPromoter {
    store: Guarded,
    validator: TokenValidator,
}

impl AdminPromoter {
    #[must_use]
    pub fn new(store: Guarded, validator: TokenValidator) -> Self {
        Self { store, validator }
    }

    /// Grant admin eligibility to `target_email`.
    /// # Errors
    /// `Forbidden` unless `caller_access_token` is a live admin token, then
    /// `Validation` or store failures.
    #[instrument(skip(self, caller_access_token))]
    pub async fn promote(
        &self,
        caller_access_token: &str,
        target_email: &str,
    ) -> Result<(), AuthError> {
        // A missing caller token is an invalid token, not malformed input.
        if caller_access_token.trim().is_empty()
            || !self.validator.validate(caller_access_token, true).await?
        {
            debug!("promotion attempted without an admin token");
            return Err(AuthError::Forbidden);
        }

        let email = checked_email(target_email)?;
        self.store
            .set(Namespace::AdminEmails, &email, "1", None)
            .await?;

        info!(email = %email, "account promoted to admin");
        Ok(())
    }

    /// Mark an email admin-eligible without a caller check. Startup only.
    /// # Errors
    /// `Validation` or store failures.
    pub async fn bootstrap(&self, email: &str) -> Result<(), AuthError> {
        let email = checked_email(email)?;
        self.store
            .set(Namespace::AdminEmails, &email, "1", None)
            .await?;
        Ok(())
    }
}
