//! Small helpers for input validation and random identifiers.

use rand::{rngs::OsRng, Rng};
use regex::Regex;

/// Activation codes and tokens are decimal integers below this bound.
const CODE_SPACE: u64 = 1_000_000_000_000_000_000;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Random identifier used for activation codes, access tokens and refresh tokens.
pub(crate) fn generate_code() -> String {
    OsRng.gen_range(0..CODE_SPACE).to_string()
}

/// Normalize and check an email, rejecting blanks and malformed addresses.
pub(crate) fn checked_email(email: &str) -> Result<String, super::AuthError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(super::AuthError::validation("Missing email"));
    }
    if !valid_email(&email) {
        return Err(super::AuthError::validation("Invalid email"));
    }
    Ok(email)
}
