use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::hac::models::SessionInfo;

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub base_url: String,
    pub username: String,
    pub environment: String,
}

impl SessionKey {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            environment: environment.into(),
        }
    }

    /// Stable hex digest of the tuple. The parts are framed as a JSON array, so no two
    /// distinct tuples hash the same input string.
    pub fn cache_key(&self) -> String {
        let framed = serde_json::json!([self.base_url, self.username, self.environment]).to_string();
        format!("{:x}", Md5::digest(framed.as_bytes()))
    }
}

/// A cached session plus where and when it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub csrf_token: String,
    pub route_cookie: Option<String>,
    pub is_authenticated: bool,
    pub environment: String,
    pub base_url: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl SessionMetadata {
    pub fn new(key: &SessionKey, session: &SessionInfo) -> Self {
        let now = Utc::now();
        Self {
            session_id: session.session_id.clone(),
            csrf_token: session.csrf_token.clone(),
            route_cookie: session.route_cookie.clone(),
            is_authenticated: session.is_authenticated,
            environment: key.environment.clone(),
            base_url: key.base_url.clone(),
            username: key.username.clone(),
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.base_url, &self.username, &self.environment)
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            csrf_token: self.csrf_token.clone(),
            route_cookie: self.route_cookie.clone(),
            is_authenticated: self.is_authenticated,
        }
    }

    /// Copy with the session id and CSRF token shortened, for listings.
    pub fn masked(&self) -> Self {
        Self {
            session_id: mask(&self.session_id),
            csrf_token: mask(&self.csrf_token),
            ..self.clone()
        }
    }
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
