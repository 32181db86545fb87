//! Postgres-backed keyed store.
//!
//! All namespaces share the `kv` table. Expiry is stored as an absolute
//! timestamp; reads filter expired rows and a background sweeper deletes them.
//! Atomicity comes from single-statement upserts and from wrapping multi-key
//! calls in one transaction: a concurrent `DELETE ... RETURNING` on a row that
//! another transaction already removed returns nothing, which is what makes
//! [`KeyStore::take`] a safe winner election.

use super::{Key, KeyStore, Namespace, Op, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnection, PgPoolOptions},
    Connection, PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument, Span};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const SELECT_LIVE: &str = r"
    SELECT value FROM kv
    WHERE namespace = $1 AND key = $2
      AND (expires_at IS NULL OR expires_at > NOW())
";

const UPSERT: &str = r"
    INSERT INTO kv (namespace, key, value, expires_at)
    VALUES ($1, $2, $3, NOW() + $4::bigint * INTERVAL '1 millisecond')
    ON CONFLICT (namespace, key)
    DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
";

// Only an expired row may be overwritten.
const INSERT_IF_ABSENT: &str = r"
    INSERT INTO kv (namespace, key, value, expires_at)
    VALUES ($1, $2, $3, NOW() + $4::bigint * INTERVAL '1 millisecond')
    ON CONFLICT (namespace, key)
    DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
    WHERE kv.expires_at IS NOT NULL AND kv.expires_at <= NOW()
";

const COMPARE_AND_SET: &str = r"
    UPDATE kv SET value = $4
    WHERE namespace = $1 AND key = $2 AND value = $3
      AND (expires_at IS NULL OR expires_at > NOW())
";

const DELETE_RETURNING: &str = r"
    DELETE FROM kv
    WHERE namespace = $1 AND key = $2
    RETURNING value, (expires_at IS NULL OR expires_at > NOW()) AS live
";

const DELETE: &str = "DELETE FROM kv WHERE namespace = $1 AND key = $2";

const PURGE: &str = "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= NOW()";

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn ttl_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    /// # Errors
    /// Returns an error if the pool cannot be established.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist yet.
    /// # Errors
    /// Returns an error if a schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(info_span!("db.migrate", db.system = "postgresql"))
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }
}

async fn write_op(conn: &mut PgConnection, op: &Op) -> Result<(), sqlx::Error> {
    match op {
        Op::Set { key, value, ttl } => {
            sqlx::query(UPSERT)
                .bind(key.namespace.as_str())
                .bind(&key.key)
                .bind(value)
                .bind(ttl_millis(*ttl))
                .execute(&mut *conn)
                .instrument(query_span("UPSERT", UPSERT))
                .await?;
        }
        Op::Delete { key } => {
            sqlx::query(DELETE)
                .bind(key.namespace.as_str())
                .bind(&key.key)
                .execute(&mut *conn)
                .instrument(query_span("DELETE", DELETE))
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl KeyStore for PgStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(SELECT_LIVE)
            .bind(namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", SELECT_LIVE))
            .await?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let op = Op::set_with_ttl(namespace, key, value, ttl);
        write_op(&mut conn, &op).await?;
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(INSERT_IF_ABSENT)
            .bind(namespace.as_str())
            .bind(key)
            .bind(value)
            .bind(ttl_millis(ttl))
            .execute(&self.pool)
            .instrument(query_span("INSERT", INSERT_IF_ABSENT))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_set(
        &self,
        namespace: Namespace,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(COMPARE_AND_SET)
            .bind(namespace.as_str())
            .bind(key)
            .bind(expected)
            .bind(new)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", COMPARE_AND_SET))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn take(&self, keys: &[Key]) -> Result<Vec<Option<String>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut values = Vec::with_capacity(keys.len());

        for key in keys {
            let row = sqlx::query(DELETE_RETURNING)
                .bind(key.namespace.as_str())
                .bind(&key.key)
                .fetch_optional(&mut *tx)
                .instrument(query_span("DELETE", DELETE_RETURNING))
                .await?;

            values.push(row.and_then(|row| {
                let live: bool = row.get("live");
                live.then(|| row.get("value"))
            }));
        }

        tx.commit().await?;
        Ok(values)
    }

    async fn apply(&self, ops: &[Op]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for op in ops {
            write_op(&mut tx, op).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(PURGE)
            .execute(&self.pool)
            .instrument(query_span("DELETE", PURGE))
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await?;
        Ok(())
    }
}
