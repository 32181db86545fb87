use crate::{
    auth::{AuthConfig, AuthState, TokenPair},
    keyward,
    notify::{
        spawn_consumer, spawn_outbox_worker, ChannelNotifier, LinkSender, LogLinkSender, Notifier,
        OutboxConfig, OutboxNotifier,
    },
    store::{spawn_sweeper, Guarded, KeyStore, MemoryStore, PgStore},
};
use anyhow::{anyhow, bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tokio::signal;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub public_url: String,
    pub access_token_ttl: u64,
    pub store_timeout: Duration,
    pub store_retry_backoff: Duration,
    pub sweep_interval: Duration,
    pub outbox_poll_interval: u64,
    pub outbox_batch_size: usize,
    pub bootstrap: Bootstrap,
}

/// First administrator, seeded at startup.
#[derive(Debug, Default)]
pub struct Bootstrap {
    pub tokens: Option<(SecretString, SecretString)>,
    pub email: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Backend {
    Memory,
    Postgres,
}

impl Backend {
    fn from_dsn(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).context("Invalid DSN")?;
        match url.scheme() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            scheme => bail!("Unsupported DSN scheme: {scheme}"),
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, bootstrap fails, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let sender: Arc<dyn LinkSender> = Arc::new(LogLinkSender);

    let (backend, notifier): (Arc<dyn KeyStore>, Arc<dyn Notifier>) =
        match Backend::from_dsn(&args.dsn)? {
            Backend::Memory => {
                warn!("Using the in-memory store, all state is lost on restart");
                let (notifier, queue) = ChannelNotifier::channel();
                spawn_consumer(queue, sender);
                (Arc::new(MemoryStore::new()), Arc::new(notifier))
            }
            Backend::Postgres => {
                let store = PgStore::connect(&args.dsn).await?;
                store.migrate().await?;

                let outbox = OutboxConfig::new()
                    .with_poll_interval_seconds(args.outbox_poll_interval)
                    .with_batch_size(args.outbox_batch_size);
                spawn_outbox_worker(store.pool().clone(), sender, outbox);

                let notifier = OutboxNotifier::new(store.pool().clone());
                (Arc::new(store), Arc::new(notifier))
            }
        };

    spawn_sweeper(backend.clone(), args.sweep_interval);

    let store = Guarded::new(backend, args.store_timeout, args.store_retry_backoff);
    let config =
        AuthConfig::new(args.public_url.clone()).with_access_token_ttl_seconds(args.access_token_ttl);
    let state = AuthState::new(store, notifier, config);

    bootstrap(&state, &args.bootstrap).await?;

    keyward::new(args.port, state, shutdown_signal()).await
}

async fn bootstrap(state: &AuthState, bootstrap: &Bootstrap) -> Result<()> {
    if let Some((access, refresh)) = &bootstrap.tokens {
        let pair = TokenPair {
            access_token: access.expose_secret().to_string(),
            refresh_token: refresh.expose_secret().to_string(),
        };
        state
            .sessions()
            .seed_admin_pair(&pair)
            .await
            .map_err(|err| anyhow!("Failed to seed bootstrap admin tokens: {err}"))?;
        info!("Bootstrap admin token pair installed");
    }

    if let Some(email) = &bootstrap.email {
        state
            .promoter()
            .bootstrap(email)
            .await
            .map_err(|err| anyhow!("Failed to mark bootstrap admin email: {err}"))?;
        info!(email, "Bootstrap admin email installed");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("public_url", args.public_url.clone()),
        ("access_token_ttl", format!("{}s", args.access_token_ttl)),
        (
            "store_timeout",
            format!("{}ms", args.store_timeout.as_millis()),
        ),
        (
            "bootstrap_tokens_set",
            args.bootstrap.tokens.is_some().to_string(),
        ),
        (
            "bootstrap_email",
            args.bootstrap
                .email
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "keyward {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
