use crate::cli::{
    actions::{
        server::{Args, Bootstrap},
        Action,
    },
    commands::{bootstrap, store},
};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8081);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let public_url = matches
        .get_one::<String>("public-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:8081".to_string());
    url::Url::parse(&public_url).context("invalid --public-url")?;

    let millis = |id: &str, default: u64| {
        Duration::from_millis(matches.get_one::<u64>(id).copied().unwrap_or(default))
    };
    let seconds = |id: &str, default: u64| matches.get_one::<u64>(id).copied().unwrap_or(default);

    Ok(Action::Server(Args {
        port,
        dsn,
        public_url,
        access_token_ttl: seconds("access-token-ttl", 3600),
        store_timeout: millis(store::ARG_STORE_TIMEOUT_MS, 2000),
        store_retry_backoff: millis(store::ARG_STORE_RETRY_BACKOFF_MS, 100),
        sweep_interval: Duration::from_secs(seconds(store::ARG_SWEEP_INTERVAL, 60)),
        outbox_poll_interval: seconds(store::ARG_OUTBOX_POLL_INTERVAL, 2),
        outbox_batch_size: matches
            .get_one::<u64>(store::ARG_OUTBOX_BATCH_SIZE)
            .copied()
            .map_or(10, |size| usize::try_from(size).unwrap_or(usize::MAX)),
        bootstrap: bootstrap_args(matches)?,
    }))
}

fn bootstrap_args(matches: &clap::ArgMatches) -> Result<Bootstrap> {
    let secret = |id: &str| {
        matches
            .get_one::<String>(id)
            .filter(|value| !value.is_empty())
            .cloned()
            .map(SecretString::from)
    };

    let tokens = match (
        secret(bootstrap::ARG_ACCESS_TOKEN),
        secret(bootstrap::ARG_REFRESH_TOKEN),
    ) {
        (Some(access), Some(refresh)) => Some((access, refresh)),
        (None, None) => None,
        _ => bail!(
            "--{} and --{} must be set together",
            bootstrap::ARG_ACCESS_TOKEN,
            bootstrap::ARG_REFRESH_TOKEN
        ),
    };

    Ok(Bootstrap {
        tokens,
        email: matches.get_one::<String>(bootstrap::ARG_EMAIL).cloned(),
    })
}
