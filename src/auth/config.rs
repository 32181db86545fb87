use argon2::Params;
use std::time::Duration;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_PUBLIC_URL: &str = "http://localhost:8081";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_url: String,
    access_token_ttl: Duration,
    password_params: Params,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_url: String) -> Self {
        Self {
            public_url,
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            password_params: Params::default(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_token_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_password_params(mut self, params: Params) -> Self {
        self.password_params = params;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub(crate) fn password_params(&self) -> &Params {
        &self.password_params
    }

    /// Link mailed to the user; visiting it activates the account.
    #[must_use]
    pub fn activation_link(&self, code: &str) -> String {
        let base = self.public_url.trim_end_matches('/');
        format!("{base}/links/{code}")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_URL.to_string())
    }
}
