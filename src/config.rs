use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HacError, HacResult};
use crate::hac::auth::AuthHandler;
use crate::hac::client::{ClientOptions, HacClient};
use crate::store::{FileSessionStore, SessionStore};

/// Where sessions are cached between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// One JSON file per session under `session_dir`.
    #[default]
    File,
    /// One row per session in the database at `session_db_url`.
    Sqlite,
    /// No caching; every process logs in afresh.
    None,
}

impl FromStr for CacheBackend {
    type Err = HacError;

    fn from_str(s: &str) -> HacResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "none" | "off" | "disabled" => Ok(Self::None),
            other => Err(HacError::Config(format!(
                "Unknown session cache '{other}', expected file, sqlite or none"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Console base URL (e.g. https://localhost:9002)
    pub base_url: String,
    pub username: String,
    /// Required before a client can be built.
    pub password: Option<String>,
    /// Session cache partition (local, dev, prod, ...)
    pub environment: String,
    pub timeout_secs: u64,
    pub ignore_ssl: bool,
    pub quiet: bool,
    pub session_cache: CacheBackend,
    pub session_dir: PathBuf,
    /// SQLite database URL for the sqlite cache backend
    pub session_db_url: String,
}

impl Config {
    pub fn from_env() -> HacResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HacResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let default_dir = FileSessionStore::default_dir();

        Ok(Self {
            base_url: var("HAC_URL").unwrap_or_else(|| "https://localhost:9002".into()),
            username: var("HAC_USERNAME").unwrap_or_else(|| "admin".into()),
            password: var("HAC_PASSWORD"),
            environment: var("HAC_ENVIRONMENT").unwrap_or_else(|| "local".into()),
            timeout_secs: match var("HAC_TIMEOUT_SECS") {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| HacError::Config(format!("HAC_TIMEOUT_SECS must be a whole number, got '{raw}'")))?,
                None => 30,
            },
            ignore_ssl: parse_flag("HAC_IGNORE_SSL", var("HAC_IGNORE_SSL"))?,
            quiet: parse_flag("HAC_QUIET", var("HAC_QUIET"))?,
            session_cache: var("HAC_SESSION_CACHE")
                .map(|raw| raw.parse::<CacheBackend>())
                .transpose()?
                .unwrap_or_default(),
            session_db_url: var("HAC_SESSION_DB_URL").unwrap_or_else(|| {
                format!("sqlite://{}?mode=rwc", default_dir.join("sessions.db").display())
            }),
            session_dir: var("HAC_SESSION_DIR").map(PathBuf::from).unwrap_or(default_dir),
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            environment: self.environment.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ignore_ssl: self.ignore_ssl,
            quiet: self.quiet,
        }
    }

    pub fn auth(&self) -> HacResult<AuthHandler> {
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| HacError::Config("HAC_PASSWORD (or --password) is required".into()))?;
        Ok(AuthHandler::basic(&self.username, password))
    }

    /// Open the configured cache. A SQLite cache that cannot be opened disables caching
    /// for this run instead of failing it.
    pub async fn open_store(&self) -> Option<SessionStore> {
        match self.session_cache {
            CacheBackend::None => None,
            CacheBackend::File => Some(SessionStore::file(self.session_dir.clone()).await),
            CacheBackend::Sqlite => match SessionStore::sqlite(&self.session_db_url).await {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!(url = %self.session_db_url, error = %e, "Session database unavailable, caching disabled");
                    None
                }
            },
        }
    }

    pub async fn build_client(&self) -> HacResult<HacClient> {
        let auth = self.auth()?;
        let store = self.open_store().await;
        HacClient::new(self.client_options(), auth, store)
    }
}

fn parse_flag(name: &str, raw: Option<String>) -> HacResult<bool> {
    let Some(raw) = raw else { return Ok(false) };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HacError::Config(format!("{name} must be true or false, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> HacResult<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.base_url, "https://localhost:9002");
        assert_eq!(config.username, "admin");
        assert_eq!(config.environment, "local");
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.ignore_ssl);
        assert!(!config.quiet);
        assert_eq!(config.session_cache, CacheBackend::File);
        assert!(config.session_db_url.starts_with("sqlite://"));
        assert!(config.session_db_url.ends_with("sessions.db?mode=rwc"));
        assert!(config.auth().is_err());
    }

    #[test]
    fn reads_variables() {
        let config = config(&[
            ("HAC_URL", "https://hac.example.com"),
            ("HAC_USERNAME", "deployer"),
            ("HAC_PASSWORD", "secret"),
            ("HAC_ENVIRONMENT", "prod"),
            ("HAC_TIMEOUT_SECS", "120"),
            ("HAC_IGNORE_SSL", "yes"),
            ("HAC_QUIET", "1"),
            ("HAC_SESSION_CACHE", "SQLite"),
            ("HAC_SESSION_DIR", "/tmp/hac"),
        ])
        .unwrap();

        let options = config.client_options();
        assert_eq!(options.base_url, "https://hac.example.com");
        assert_eq!(options.environment, "prod");
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert!(options.ignore_ssl && options.quiet);
        assert_eq!(config.session_cache, CacheBackend::Sqlite);
        assert_eq!(config.session_dir, PathBuf::from("/tmp/hac"));
        assert_eq!(config.auth().unwrap().username(), "deployer");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("HAC_TIMEOUT_SECS", "soon")]), Err(HacError::Config(_))));
        assert!(matches!(config(&[("HAC_IGNORE_SSL", "maybe")]), Err(HacError::Config(_))));
        assert!(matches!(config(&[("HAC_SESSION_CACHE", "redis")]), Err(HacError::Config(_))));
        assert_eq!(
            config(&[("HAC_SESSION_CACHE", "none"), ("HAC_URL", "")]).unwrap().session_cache,
            CacheBackend::None
        );
    }

    #[tokio::test]
    async fn disabled_cache_opens_nothing() {
        let config = Config {
            session_cache: CacheBackend::None,
            ..config(&[]).unwrap()
        };
        assert!(config.open_store().await.is_none());
    }
}
