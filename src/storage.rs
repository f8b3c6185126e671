//! SQLite storage layer for Adpulse.
//!
//! The only persisted state is the credential pair, kept as two rows of a
//! small key/value table so it survives restarts until an explicit logout.
//! Metrics are never stored; every view re-fetches.

use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Row};

use crate::model::Credentials;

/// Key under which the ad account id is stored.
pub const ACCOUNT_ID_KEY: &str = "account_id";

/// Key under which the access token is stored.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:adpulse.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // A single connection keeps `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM settings WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Persist both credential values in one transaction.
    pub async fn save_credentials(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        upsert(&mut *tx, ACCOUNT_ID_KEY, &credentials.account_id).await?;
        upsert(&mut *tx, ACCESS_TOKEN_KEY, &credentials.access_token).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Load the credential pair, if both halves are present and non-empty.
    pub async fn load_credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let account_id = self.get_value(ACCOUNT_ID_KEY).await?;
        let access_token = self.get_value(ACCESS_TOKEN_KEY).await?;

        Ok(match (account_id, access_token) {
            (Some(id), Some(token)) => {
                let credentials = Credentials::new(id, token);
                (!credentials.is_blank()).then_some(credentials)
            }
            _ => None,
        })
    }

    /// Remove both credential values.
    pub async fn clear_credentials(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM settings WHERE key IN (?, ?)
            "#,
        )
        .bind(ACCOUNT_ID_KEY)
        .bind(ACCESS_TOKEN_KEY)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Insert or replace a single value.
async fn upsert<'e, E>(executor: E, key: &str, value: &str) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}
