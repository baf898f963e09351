//! Local session cache.
//!
//! Caching is an optimisation only: every backend error is logged and swallowed here,
//! so callers see either a cached session or nothing.

mod file;
mod metadata;
mod sqlite;

pub use file::FileSessionStore;
pub use metadata::{SessionKey, SessionMetadata};
pub use sqlite::SqliteSessionStore;

use std::path::PathBuf;

use crate::db::Database;

/// Persisted sessions, one entry per (base URL, user, environment).
#[derive(Debug, Clone)]
pub enum SessionStore {
    /// Pretty-printed JSON file per entry.
    File(FileSessionStore),
    /// Row per entry in a SQLite table.
    Sqlite(SqliteSessionStore),
}

impl SessionStore {
    pub async fn file(dir: impl Into<PathBuf>) -> Self {
        Self::File(FileSessionStore::new(dir).await)
    }

    pub async fn sqlite(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::connect(database_url).await?;
        db.migrate().await?;
        Ok(Self::Sqlite(SqliteSessionStore::new(db)))
    }

    fn backend(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Cached session for `key`. Corrupt entries are deleted and reported as absent.
    pub async fn load(&self, key: &SessionKey) -> Option<SessionMetadata> {
        let result = match self {
            Self::File(store) => store.load(key).await,
            Self::Sqlite(store) => store.load(key).await,
        };
        result.unwrap_or_else(|e| {
            tracing::debug!(backend = self.backend(), error = %e, "Session cache read failed");
            None
        })
    }

    /// Store `metadata`, keeping the `created_at` of an existing entry for the same key
    /// and stamping `last_used_at` with the current time.
    pub async fn save(&self, metadata: &SessionMetadata) {
        let result = match self {
            Self::File(store) => store.save(metadata).await,
            Self::Sqlite(store) => store.save(metadata).await,
        };
        if let Err(e) = result {
            tracing::warn!(backend = self.backend(), error = %e, "Failed to persist session");
        }
    }

    /// Delete the entry for `key`. Absent keys are a no-op.
    pub async fn remove(&self, key: &SessionKey) {
        let result = match self {
            Self::File(store) => store.remove(key).await,
            Self::Sqlite(store) => store.remove(key).await,
        };
        if let Err(e) = result {
            tracing::debug!(backend = self.backend(), error = %e, "Failed to remove cached session");
        }
    }

    /// Bump `last_used_at` of an existing entry.
    pub async fn touch(&self, key: &SessionKey) {
        let result = match self {
            Self::File(store) => store.touch(key).await,
            Self::Sqlite(store) => store.touch(key).await,
        };
        if let Err(e) = result {
            tracing::debug!(backend = self.backend(), error = %e, "Failed to touch cached session");
        }
    }

    /// All readable entries, most recently used first.
    pub async fn list_all(&self) -> Vec<SessionMetadata> {
        let result = match self {
            Self::File(store) => store.list_all().await,
            Self::Sqlite(store) => store.list_all().await,
        };
        let mut sessions = result.unwrap_or_else(|e| {
            tracing::debug!(backend = self.backend(), error = %e, "Failed to list cached sessions");
            Vec::new()
        });
        sessions.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        sessions
    }

    /// Remove every entry; returns how many were removed.
    pub async fn clear_all(&self) -> usize {
        let result = match self {
            Self::File(store) => store.clear_all().await,
            Self::Sqlite(store) => store.clear_all().await,
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(backend = self.backend(), error = %e, "Failed to clear session cache");
            0
        })
    }
}
