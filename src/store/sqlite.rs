use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::metadata::{SessionKey, SessionMetadata};
use crate::db::Database;

/// Sessions as rows of the `hac_sessions` table.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

/// Row from SQLite. Timestamps are RFC 3339 text.
#[derive(sqlx::FromRow)]
struct SessionRow {
    cache_key: String,
    base_url: String,
    username: String,
    environment: String,
    session_id: String,
    csrf_token: String,
    route_cookie: Option<String>,
    is_authenticated: bool,
    created_at: String,
    last_used_at: String,
}

impl TryFrom<SessionRow> for SessionMetadata {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Self {
            created_at: parse_timestamp(&row.created_at).context("created_at")?,
            last_used_at: parse_timestamp(&row.last_used_at).context("last_used_at")?,
            session_id: row.session_id,
            csrf_token: row.csrf_token,
            route_cookie: row.route_cookie,
            is_authenticated: row.is_authenticated,
            environment: row.environment,
            base_url: row.base_url,
            username: row.username,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

const SELECT_COLUMNS: &str = "SELECT cache_key, base_url, username, environment, session_id, csrf_token, \
     route_cookie, is_authenticated, created_at, last_used_at FROM hac_sessions";

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn load(&self, key: &SessionKey) -> Result<Option<SessionMetadata>> {
        let cache_key = key.cache_key();
        let row = sqlx::query_as::<_, SessionRow>(&format!("{SELECT_COLUMNS} WHERE cache_key = ?"))
            .bind(&cache_key)
            .fetch_optional(&self.db.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        match SessionMetadata::try_from(row) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                tracing::debug!(cache_key, error = %e, "Removing corrupt session cache row");
                self.delete(&cache_key).await?;
                Ok(None)
            }
        }
    }

    pub async fn save(&self, metadata: &SessionMetadata) -> Result<()> {
        // created_at is only written on insert, so updates keep the original value.
        sqlx::query(
            "INSERT INTO hac_sessions (cache_key, base_url, username, environment, session_id, \
             csrf_token, route_cookie, is_authenticated, created_at, last_used_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(cache_key) DO UPDATE SET session_id = excluded.session_id, \
             csrf_token = excluded.csrf_token, route_cookie = excluded.route_cookie, \
             is_authenticated = excluded.is_authenticated, last_used_at = excluded.last_used_at",
        )
        .bind(metadata.key().cache_key())
        .bind(&metadata.base_url)
        .bind(&metadata.username)
        .bind(&metadata.environment)
        .bind(&metadata.session_id)
        .bind(&metadata.csrf_token)
        .bind(&metadata.route_cookie)
        .bind(metadata.is_authenticated)
        .bind(metadata.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &SessionKey) -> Result<()> {
        self.delete(&key.cache_key()).await
    }

    async fn delete(&self, cache_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM hac_sessions WHERE cache_key = ?")
            .bind(cache_key)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    pub async fn touch(&self, key: &SessionKey) -> Result<()> {
        sqlx::query("UPDATE hac_sessions SET last_used_at = ? WHERE cache_key = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(key.cache_key())
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<SessionMetadata>> {
        let rows = sqlx::query_as::<_, SessionRow>(SELECT_COLUMNS)
            .fetch_all(&self.db.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let cache_key = row.cache_key.clone();
                SessionMetadata::try_from(row)
                    .map_err(|e| tracing::debug!(cache_key, error = %e, "Skipping corrupt session cache row"))
                    .ok()
            })
            .collect())
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM hac_sessions").execute(&self.db.pool).await?;
        Ok(result.rows_affected() as usize)
    }
}
