//! Account, session and authorization logic.
//!
//! Everything here talks to storage through [`Guarded`] and to the outside
//! world through a [`Notifier`]; the HTTP layer only translates requests.

mod accounts;
mod admin;
mod config;
mod error;
pub(crate) mod password;
mod sessions;
pub(crate) mod utils;
mod validator;

pub use accounts::AccountManager;
pub use admin::AdminPromoter;
pub use config::AuthConfig;
pub use error::AuthError;
pub use password::Passwords;
pub use sessions::{SessionManager, TokenPair};
pub use validator::TokenValidator;

use crate::{notify::Notifier, store::Guarded};
use std::sync::Arc;

/// Components shared by every request handler.
#[derive(Clone)]
pub struct AuthState {
    store: Guarded,
    accounts: AccountManager,
    sessions: SessionManager,
    promoter: AdminPromoter,
    validator: TokenValidator,
}

impl AuthState {
    #[must_use]
    pub fn new(store: Guarded, notifier: Arc<dyn Notifier>, config: AuthConfig) -> Self {
        let passwords = Passwords::new(config.password_params().clone());
        let accounts = AccountManager::new(store.clone(), notifier, passwords, config.clone());
        let sessions = SessionManager::new(store.clone(), accounts.clone(), config);
        let validator = TokenValidator::new(store.clone());
        let promoter = AdminPromoter::new(store.clone(), validator.clone());

        Self {
            store,
            accounts,
            sessions,
            promoter,
            validator,
        }
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn promoter(&self) -> &AdminPromoter {
        &self.promoter
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    #[must_use]
    pub fn store(&self) -> &Guarded {
        &self.store
    }
}
