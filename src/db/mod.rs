use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

/// File behind a `sqlite:` URL, `None` for in-memory databases.
fn database_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

impl Database {
    /// Open the session database, creating the file and its directory when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let path = database_path(url);
        if let Some(parent) = path.as_deref().and_then(|p| p.parent()).filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating session cache directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing session database URL {url}"))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("opening session database {url}"))?;

        tracing::debug!(path = ?path, "Session database opened");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hac_sessions (
                cache_key TEXT PRIMARY KEY,
                base_url TEXT NOT NULL,
                username TEXT NOT NULL,
                environment TEXT NOT NULL,
                session_id TEXT NOT NULL,
                csrf_token TEXT NOT NULL,
                route_cookie TEXT,
                is_authenticated INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_used_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_hac_sessions_last_used ON hac_sessions(last_used_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating session cache schema")?;

        tracing::debug!("Session cache schema ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_from_url() {
        assert_eq!(
            database_path("sqlite:///var/cache/hac/sessions.db?mode=rwc"),
            Some(PathBuf::from("/var/cache/hac/sessions.db"))
        );
        assert_eq!(database_path("sqlite:sessions.db"), Some(PathBuf::from("sessions.db")));
        assert_eq!(database_path("sqlite::memory:"), None);
        assert_eq!(database_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn creates_missing_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("cache").join("sessions.db");
        let url = format!("sqlite://{}", file.display());

        let db = Database::connect(&url).await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        assert!(file.exists());
    }

    #[tokio::test]
    async fn in_memory_database() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
    }
}
