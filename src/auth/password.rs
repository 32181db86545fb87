//! Password hashing using Argon2id.
//!
//! Hashes are PHC strings carrying their own random salt and parameters, so a
//! stored hash stays verifiable after the configured cost changes. Hashing is
//! CPU bound and runs on the blocking pool.

use super::AuthError;
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;
use tokio::task::spawn_blocking;

#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
}

impl Passwords {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Hash a password with a fresh salt.
    /// # Errors
    /// Returns `AuthError::Internal` if hashing fails.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();

        spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("hash error: {e}")))
        })
        .await
        .map_err(|e| AuthError::Internal(format!("hash task failed: {e}")))?
    }

    /// Check a password against a stored PHC hash.
    ///
    /// Returns `Ok(false)` on mismatch. The comparison is constant time.
    /// # Errors
    /// Returns `AuthError::Internal` if the stored hash is malformed.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();
        let hash = hash.to_string();

        spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AuthError::Internal(format!("invalid hash format: {e}")))?;

            match argon2.verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(AuthError::Internal(format!("verify error: {e}"))),
            }
        })
        .await
        .map_err(|e| AuthError::Internal(format!("verify task failed: {e}")))?
    }
}

impl Default for Passwords {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

#[cfg(test)]
pub(crate) fn fast_params() -> Params {
    #[allow(clippy::unwrap_used)]
    Params::new(1024, 1, 1, None).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correct_password_matches() {
        let passwords = Passwords::new(fast_params());
        let hash = passwords.hash("hunter2").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify("hunter2", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_password_does_not_match() {
        let passwords = Passwords::new(fast_params());
        let hash = passwords.hash("hunter2").await.unwrap();
        assert!(!passwords.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let passwords = Passwords::new(fast_params());
        let first = passwords.hash("pw1").await.unwrap();
        let second = passwords.hash("pw1").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn malformed_hash_returns_error() {
        let passwords = Passwords::new(fast_params());
        let result = passwords.verify("pw", "not-a-hash").await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }
}
