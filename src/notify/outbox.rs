use super::{LinkSender, Notifier, NotifyError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info_span, Instrument};

/// Writes activation links into the `activation_outbox` table.
#[derive(Clone, Debug)]
pub struct OutboxNotifier {
    pool: PgPool,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        let query = "INSERT INTO activation_outbox (body) VALUES ($1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(message)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map(|_| ())
            .map_err(|err| NotifyError::Rejected(err.to_string()))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl OutboxConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 10,
            max_attempts: 5,
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace values that would stall the worker.
    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        Self {
            poll_interval,
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn LinkSender>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    let config = config.normalize();
    tokio::spawn(async move {
        let poll_interval = config.poll_interval();
        loop {
            match process_outbox_batch(&pool, sender.as_ref(), &config).await {
                Ok(0) => (),
                Ok(count) => debug!("activation outbox processed {count} messages"),
                Err(err) => error!("activation outbox batch failed: {err:#}"),
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn LinkSender,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start activation outbox transaction")?;

    let query = r"
        SELECT id, body
        FROM activation_outbox
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load activation outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: i64 = row.get("id");
        let body: String = row.get("body");
        let send_result = sender.send(&body);
        update_outbox_status(&mut tx, id, send_result, config.max_attempts()).await?;
    }

    tx.commit()
        .await
        .context("failed to commit activation outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
    send_result: Result<()>,
    max_attempts: u32,
) -> Result<()> {
    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE activation_outbox
                SET status = 'sent',
                    attempts = attempts + 1,
                    last_error = NULL,
                    sent_at = NOW()
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to mark activation link as sent")?;
        }
        Err(err) => {
            // Stays pending until the attempt budget is spent.
            let query = r"
                UPDATE activation_outbox
                SET status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE 'pending' END,
                    attempts = attempts + 1,
                    last_error = $2
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(format!("{err:#}"))
                .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to record activation link failure")?;
        }
    }

    Ok(())
}
