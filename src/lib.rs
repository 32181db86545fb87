//! # Keyward (account activation and session tokens)
//!
//! `keyward` registers accounts behind an emailed activation link, issues
//! access/refresh token pairs on login, rotates them, and answers the question
//! every other service asks: "is this access token valid, and may it write?"
//!
//! ## Tokens
//!
//! A pair is stored as directional entries in a keyed store: access to refresh
//! (expiring with the access token) and refresh to access. An admin flag is
//! attached to each token when the pair is minted, so promoting an account
//! only takes effect at its next login. Rotation carries the flag forward.
//!
//! ## Storage
//!
//! All state lives behind [`store::KeyStore`]. `memory://` selects an
//! in-process map, `postgres://` a single `kv` table in `PostgreSQL`. Atomic
//! multi-key primitives at that boundary make concurrent rotations of the same
//! refresh token resolve to exactly one winner.

pub mod auth;
pub mod cli;
pub mod client;
pub mod keyward;
pub mod notify;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("keyward/"));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
