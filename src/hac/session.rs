//! Session lifecycle: cached-session reuse, form login and eviction.
//!
//! ```text
//! NoSession --login--> (cached? validate : fresh login) --> Authenticated
//! Authenticated --401/403/405 or failed validation--> NoSession
//! ```

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tokio::sync::Mutex;

use super::auth::{self, AuthHandler};
use super::cookies::SessionCookies;
use super::html::{self, CSRF_FIELD};
use super::models::SessionInfo;
use super::{LOGIN_CHECK_PATH, ROOT_PATH};
use crate::error::{HacError, HacResult};
use crate::store::{SessionKey, SessionMetadata, SessionStore};

/// Upper bound for validating a cached session.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REDIRECTS: usize = 10;
const LOGIN_OPERATION: &str = "Failed to authenticate";

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub(crate) async fn read(response: reqwest::Response, operation: &'static str) -> HacResult<Self> {
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| HacError::request(operation, e))?;
        Ok(Self {
            status,
            url,
            headers,
            body,
        })
    }

    pub(crate) fn is_html(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

/// Owns the one session of a client instance. All changes to the in-memory session
/// and to its cache entry go through the `state` mutex.
pub struct SessionController {
    http: Client,
    base_url: String,
    environment: String,
    auth: AuthHandler,
    store: Option<SessionStore>,
    timeout: Duration,
    quiet: bool,
    state: Mutex<Option<SessionInfo>>,
}

impl SessionController {
    pub(crate) fn new(
        http: Client,
        base_url: String,
        environment: String,
        auth: AuthHandler,
        store: Option<SessionStore>,
        timeout: Duration,
        quiet: bool,
    ) -> Self {
        Self {
            http,
            base_url,
            environment,
            auth,
            store,
            timeout,
            quiet,
            state: Mutex::new(None),
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn auth(&self) -> &AuthHandler {
        &self.auth
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    /// Cache identity of this client's session.
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.base_url, self.auth.username(), &self.environment)
    }

    pub async fn current(&self) -> Option<SessionInfo> {
        self.state.lock().await.clone()
    }

    /// Establish a session: reuse a cached one if the server still accepts it,
    /// otherwise log in through the form.
    pub async fn login(&self) -> HacResult<SessionInfo> {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await
    }

    /// The current session, logging in first when there is none.
    pub async fn ensure_session(&self) -> HacResult<SessionInfo> {
        let mut state = self.state.lock().await;
        if let Some(session) = state.as_ref().filter(|s| s.is_authenticated && s.is_usable()) {
            return Ok(session.clone());
        }
        self.login_locked(&mut state).await
    }

    async fn login_locked(&self, state: &mut Option<SessionInfo>) -> HacResult<SessionInfo> {
        let key = self.key();

        if let Some(store) = &self.store {
            if let Some(cached) = store.load(&key).await {
                let session = cached.session_info();
                if session.is_authenticated && session.is_usable() && self.validate(&session).await {
                    self.announce("Using cached session");
                    *state = Some(session.clone());
                    return Ok(session);
                }
                tracing::debug!(environment = %self.environment, "Cached session no longer valid");
                store.remove(&key).await;
            }
        }

        *state = None;
        let session = self.fresh_login().await?;
        if let Some(store) = &self.store {
            store.save(&SessionMetadata::new(&key, &session)).await;
        }
        self.announce("Authenticated successfully");
        *state = Some(session.clone());
        Ok(session)
    }

    /// Load the console root with the session's cookies. Valid means HTTP 200 and
    /// no login form in the body.
    async fn validate(&self, session: &SessionInfo) -> bool {
        let mut cookies = SessionCookies::new(Some(session.session_id.clone()), session.route_cookie.clone());
        let request = self
            .http
            .get(self.url(ROOT_PATH))
            .timeout(self.timeout.min(VALIDATION_TIMEOUT));
        match self.send_following(request, &mut cookies, "Session validation").await {
            Ok(page) => page.status == StatusCode::OK && !html::is_login_page(&page.body),
            Err(e) => {
                tracing::debug!(error = %e, "Session validation request failed");
                false
            }
        }
    }

    /// Two-step Spring Security form login.
    async fn fresh_login(&self) -> HacResult<SessionInfo> {
        let mut cookies = SessionCookies::default();

        // Step 1: login page for the CSRF token and the initial cookies.
        let page = self
            .send_following(self.http.get(self.url(ROOT_PATH)), &mut cookies, LOGIN_OPERATION)
            .await?;
        if !page.status.is_success() {
            return Err(HacError::Status {
                operation: LOGIN_OPERATION,
                status: page.status,
            });
        }
        let csrf_token = html::extract_csrf_token(&page.body)
            .ok_or_else(|| HacError::auth("Could not extract CSRF token from login page"))?;

        // Step 2: submit credentials with the token and the captured cookies.
        let mut form = self.auth.initial_credentials();
        form.push((CSRF_FIELD, csrf_token.clone()));
        let request = self
            .auth
            .apply_auth(self.http.post(self.url(LOGIN_CHECK_PATH)).form(&form));
        let response = self.send_following(request, &mut cookies, LOGIN_OPERATION).await?;

        if response.status != StatusCode::OK || html::is_login_page(&response.body) {
            return Err(HacError::auth("Authentication failed - invalid credentials"));
        }

        let csrf_token = html::extract_csrf_token(&response.body).unwrap_or(csrf_token);
        let session_id = cookies.session_id.clone().unwrap_or_default();
        let mut missing = Vec::new();
        if session_id.is_empty() {
            missing.push("session_id");
        }
        if csrf_token.is_empty() {
            missing.push("csrf_token");
        }
        if !missing.is_empty() {
            return Err(HacError::auth(format!(
                "Could not establish session - missing: {}. Response status: {}, URL: {}",
                missing.join(", "),
                response.status.as_u16(),
                response.url
            )));
        }

        tracing::debug!(url = %response.url, route = cookies.route.is_some(), "Login accepted");
        Ok(SessionInfo {
            session_id,
            csrf_token,
            route_cookie: cookies.route,
            is_authenticated: true,
        })
    }

    /// Send `request`, following redirects by hand so that the `Set-Cookie` headers of
    /// every hop land in `cookies`.
    async fn send_following(
        &self,
        request: RequestBuilder,
        cookies: &mut SessionCookies,
        operation: &'static str,
    ) -> HacResult<HttpResponse> {
        let mut response = request
            .headers(auth::login_headers(cookies))
            .send()
            .await
            .map_err(|e| HacError::request(operation, e))?;

        for _ in 0..MAX_REDIRECTS {
            cookies.absorb(response.headers());
            if !response.status().is_redirection() {
                break;
            }
            let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) else {
                break;
            };
            let next = response.url().join(location).map_err(|e| {
                HacError::invalid_response(operation, format!("bad redirect location '{location}': {e}"))
            })?;
            tracing::debug!(status = %response.status(), %next, "Following redirect");
            response = self
                .http
                .get(next)
                .headers(auth::login_headers(cookies))
                .send()
                .await
                .map_err(|e| HacError::request(operation, e))?;
        }
        cookies.absorb(response.headers());

        HttpResponse::read(response, operation).await
    }

    /// Forget the session after the server rejected it. A session that has already been
    /// replaced by a newer login is left alone.
    pub(crate) async fn evict(&self, stale: &SessionInfo) {
        let mut state = self.state.lock().await;
        if state.as_ref().is_some_and(|current| current.session_id != stale.session_id) {
            return;
        }
        *state = None;
        if let Some(store) = &self.store {
            store.remove(&self.key()).await;
        }
        tracing::warn!(environment = %self.environment, "Session rejected by server, evicted");
    }

    /// Drop the in-memory session and its cache entry.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = None;
        if let Some(store) = &self.store {
            store.remove(&self.key()).await;
        }
    }

    /// Record a successful call in the cache. Failures are ignored.
    pub(crate) async fn touch(&self) {
        let Some(store) = &self.store else { return };
        let _state = self.state.lock().await;
        store.touch(&self.key()).await;
    }

    /// Pick up a rotated CSRF token or session cookie from a successful response.
    /// A login page carries anonymous values and never replaces the session.
    pub(crate) async fn refresh(&self, used: &SessionInfo, response: &HttpResponse) {
        if response.is_html() && html::is_login_page(&response.body) {
            tracing::debug!(url = %response.url, "Login page in response, session left unchanged");
            return;
        }
        let mut cookies = SessionCookies::new(Some(used.session_id.clone()), used.route_cookie.clone());
        let cookies_changed = cookies.absorb(&response.headers);

        let csrf_token = response
            .headers
            .get(auth::CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .or_else(|| response.is_html().then(|| html::extract_csrf_token(&response.body)).flatten())
            .unwrap_or_else(|| used.csrf_token.clone());

        if !cookies_changed && csrf_token == used.csrf_token {
            return;
        }

        let mut state = self.state.lock().await;
        if state.as_ref() != Some(used) {
            return;
        }
        let refreshed = SessionInfo {
            session_id: cookies.session_id.unwrap_or_else(|| used.session_id.clone()),
            csrf_token,
            route_cookie: cookies.route,
            is_authenticated: true,
        };
        tracing::debug!(cookies_changed, "Session refreshed from response");
        if let Some(store) = &self.store {
            store.save(&SessionMetadata::new(&self.key(), &refreshed)).await;
        }
        *state = Some(refreshed);
    }

    fn announce(&self, message: &str) {
        if self.quiet {
            tracing::debug!(environment = %self.environment, "{message}");
        } else {
            tracing::info!(environment = %self.environment, "{message}");
        }
    }
}
