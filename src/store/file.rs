use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use super::metadata::{SessionKey, SessionMetadata};

const FILE_PREFIX: &str = "session_";
const FILE_SUFFIX: &str = ".json";

/// One JSON document per session under a cache directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create the store, creating `dir` if needed. A directory that cannot be created
    /// just makes every later write fail (and be ignored).
    pub async fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot create session cache directory");
        }
        Self { dir }
    }

    /// Default location: `<user cache dir>/hac-client`.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("hac-client")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", key.cache_key()))
    }

    fn is_session_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
    }

    async fn read(path: &Path) -> Result<Option<SessionMetadata>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        match serde_json::from_str::<SessionMetadata>(&content) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Removing corrupt session cache file");
                remove_if_exists(path).await?;
                Ok(None)
            }
        }
    }

    async fn write(path: &Path, metadata: &SessionMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        // Write then rename so a crash never leaves a half-written entry behind.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming {}", tmp.display()))?;
        Ok(())
    }

    pub async fn load(&self, key: &SessionKey) -> Result<Option<SessionMetadata>> {
        Self::read(&self.path_for(key)).await
    }

    pub async fn save(&self, metadata: &SessionMetadata) -> Result<()> {
        let path = self.path_for(&metadata.key());
        let created_at = match Self::read(&path).await {
            Ok(Some(existing)) => existing.created_at,
            _ => metadata.created_at,
        };
        let record = SessionMetadata {
            created_at,
            last_used_at: Utc::now(),
            ..metadata.clone()
        };
        Self::write(&path, &record).await
    }

    pub async fn remove(&self, key: &SessionKey) -> Result<()> {
        remove_if_exists(&self.path_for(key)).await
    }

    pub async fn touch(&self, key: &SessionKey) -> Result<()> {
        let path = self.path_for(key);
        if let Some(mut metadata) = Self::read(&path).await? {
            metadata.last_used_at = Utc::now();
            Self::write(&path, &metadata).await?;
        }
        Ok(())
    }

    async fn session_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("listing {}", self.dir.display())),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if Self::is_session_file(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }

    pub async fn list_all(&self) -> Result<Vec<SessionMetadata>> {
        let mut sessions = Vec::new();
        for path in self.session_files().await? {
            match Self::read(&path).await {
                Ok(Some(metadata)) => sessions.push(metadata),
                Ok(None) => {}
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }
        Ok(sessions)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.session_files().await? {
            remove_if_exists(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
