//! Client other services embed to ask keyward whether a token is valid.

use crate::APP_USER_AGENT;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
    write: bool,
}

#[derive(Deserialize)]
struct ValidateResponse {
    valid: bool,
}

#[derive(Clone, Debug)]
pub struct ValidatorClient {
    client: Client,
    endpoint: Url,
}

impl ValidatorClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(5))
    }

    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client cannot be built
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).context("Invalid keyward URL")?;
        let endpoint = base.join("validate").context("Invalid keyward URL")?;

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, endpoint })
    }

    /// `Ok(false)` means the token is unknown, expired or lacks write access.
    /// # Errors
    /// Returns an error on transport failure or any non-2xx answer
    #[instrument(skip(self, token))]
    pub async fn validate(&self, token: &str, write: bool) -> Result<bool> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ValidateRequest { token, write })
            .send()
            .await
            .context("Failed to reach keyward")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("keyward answered {status}"));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .context("Invalid validation response")?;

        debug!(valid = body.valid, "token validated");

        Ok(body.valid)
    }
}
