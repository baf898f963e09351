//! Authenticated console operations: scripting, FlexibleSearch and Impex.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url, redirect};
use serde::de::DeserializeOwned;

use super::auth::{self, AuthHandler, BodyKind};
use super::html;
use super::models::{
    FlexibleSearchResult, GroovyScriptResult, ImpexResult, QueryResponse, ScriptResponse, SessionInfo,
    ValidationMode,
};
use super::session::{HttpResponse, SessionController};
use super::{FLEXSEARCH_EXECUTE_PATH, IMPEX_IMPORT_PATH, IMPEX_RESULT_CLASS, SCRIPT_EXECUTE_PATH};
use crate::error::{HacError, HacResult, is_auth_status};
use crate::store::{SessionKey, SessionStore};

/// Connection settings for one console.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// e.g. `https://localhost:9002`
    pub base_url: String,
    /// Partitions the session cache (`local`, `dev`, `prod`, ...).
    pub environment: String,
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub ignore_ssl: bool,
    /// Log session notices at debug instead of info.
    pub quiet: bool,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:9002".into(),
            environment: "local".into(),
            timeout: Duration::from_secs(30),
            ignore_ssl: false,
            quiet: false,
        }
    }
}

/// Client for one console, user and environment.
///
/// Operations log in on first use. An authentication error evicts the session; the
/// next call (or an explicit [`HacClient::login`]) logs in again. Nothing is retried.
pub struct HacClient {
    pub(crate) session: SessionController,
}

impl HacClient {
    /// `store` enables session caching; `None` keeps everything in memory.
    pub fn new(options: ClientOptions, auth: AuthHandler, store: Option<SessionStore>) -> HacResult<Self> {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| HacError::Config(format!("Invalid base URL '{}': {e}", options.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HacError::Config(format!(
                "Unsupported URL scheme '{}' in {base_url}",
                parsed.scheme()
            )));
        }

        // Redirects are followed by hand during login so every Set-Cookie is seen.
        let http = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.ignore_ssl)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| HacError::Config(format!("HTTP client error: {e}")))?;

        tracing::debug!(
            base_url,
            environment = %options.environment,
            timeout_secs = options.timeout.as_secs(),
            ignore_ssl = options.ignore_ssl,
            caching = store.is_some(),
            "HAC client ready"
        );

        Ok(Self {
            session: SessionController::new(
                http,
                base_url,
                options.environment,
                auth,
                store,
                options.timeout,
                options.quiet,
            ),
        })
    }

    /// Log in explicitly (reusing a still-valid cached session when caching is on).
    pub async fn login(&self) -> HacResult<SessionInfo> {
        self.session.login().await
    }

    pub async fn current_session(&self) -> Option<SessionInfo> {
        self.session.current().await
    }

    /// Forget the session locally and in the cache.
    pub async fn invalidate_session(&self) {
        self.session.invalidate().await
    }

    pub fn session_store(&self) -> Option<&SessionStore> {
        self.session.store()
    }

    /// Cache identity of this client's session.
    pub fn session_key(&self) -> SessionKey {
        self.session.key()
    }

    /// Run a Groovy script. `commit = false` rolls back any changes.
    pub async fn execute_groovy(&self, script: &str, commit: bool) -> HacResult<GroovyScriptResult> {
        const OP: &str = "Failed to execute Groovy script";
        let session = self.session.ensure_session().await?;

        let form = [
            ("script", script),
            ("scriptType", "groovy"),
            ("commit", if commit { "true" } else { "false" }),
        ];
        let request = self
            .post(SCRIPT_EXECUTE_PATH)
            .headers(auth::session_headers(&session, BodyKind::Form, true))
            .form(&form);
        let response = self.send_ok(OP, &session, request).await?;
        let raw: ScriptResponse = decode(OP, &response)?;

        self.session.touch().await;
        Ok(raw.into_result(commit))
    }

    /// Run a FlexibleSearch query.
    pub async fn execute_flexiblesearch(
        &self,
        query: &str,
        max_count: u32,
        locale: &str,
    ) -> HacResult<FlexibleSearchResult> {
        const OP: &str = "Failed to execute FlexibleSearch";
        let session = self.session.ensure_session().await?;

        let max_count = max_count.to_string();
        let form = [
            ("flexibleSearchQuery", query),
            ("maxCount", max_count.as_str()),
            ("locale", locale),
            ("commit", "false"),
        ];
        let request = self
            .post(FLEXSEARCH_EXECUTE_PATH)
            .headers(auth::session_headers(&session, BodyKind::Form, true))
            .form(&form);
        let response = self.send_ok(OP, &session, request).await?;
        let raw: QueryResponse = decode(OP, &response)?;

        self.session.touch().await;
        Ok(raw.into())
    }

    /// Import Impex content. The console answers with an HTML page, so content errors
    /// come back in the result rather than as an `Err`.
    pub async fn import_impex(&self, content: &str, mode: ValidationMode) -> HacResult<ImpexResult> {
        const OP: &str = "Failed to import Impex";
        let session = self.session.ensure_session().await?;

        let form = [
            ("scriptContent", content),
            ("validationEnum", mode.as_str()),
            ("encoding", "UTF-8"),
            ("maxThreads", "1"),
            ("_legacyMode", "on"),
            ("_enableCodeExecution", "on"),
        ];
        let request = self
            .post(IMPEX_IMPORT_PATH)
            .headers(auth::session_headers(&session, BodyKind::Form, false))
            .form(&form);
        let response = self.send_ok(OP, &session, request).await?;

        let (success, output) = match html::find_div_by_class(&response.body, IMPEX_RESULT_CLASS) {
            Some(container) => {
                let text = html::element_text(container);
                (!text.to_lowercase().contains("error"), text)
            }
            None => (response.status == StatusCode::OK, response.body),
        };
        if !success {
            tracing::warn!(mode = %mode, "Impex import reported errors");
        }

        self.session.touch().await;
        Ok(ImpexResult::from_output(success, output))
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.session.http().get(self.session.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.session.http().post(self.session.url(path))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        self.session.url(path)
    }

    /// Send an authenticated request. Auth statuses evict the session and become
    /// [`HacError::Authentication`]; any other status is returned to the caller.
    pub(crate) async fn send(
        &self,
        operation: &'static str,
        session: &SessionInfo,
        request: RequestBuilder,
    ) -> HacResult<HttpResponse> {
        let response = self
            .session
            .auth()
            .apply_auth(request)
            .send()
            .await
            .map_err(|e| HacError::request(operation, e))?;
        let response = HttpResponse::read(response, operation).await?;

        if is_auth_status(response.status) {
            self.session.evict(session).await;
            return Err(HacError::auth(format!(
                "Session expired or invalid (HTTP {}). Re-authenticate by calling login().",
                response.status.as_u16()
            )));
        }
        if response.status.is_success() {
            self.session.refresh(session, &response).await;
        }
        Ok(response)
    }

    /// [`Self::send`], additionally rejecting non-2xx statuses.
    pub(crate) async fn send_ok(
        &self,
        operation: &'static str,
        session: &SessionInfo,
        request: RequestBuilder,
    ) -> HacResult<HttpResponse> {
        let response = self.send(operation, session, request).await?;
        if !response.status.is_success() {
            tracing::debug!(operation, status = %response.status, body = %preview(&response.body), "Request failed");
            return Err(HacError::Status {
                operation,
                status: response.status,
            });
        }
        Ok(response)
    }
}

/// Decode a JSON body, keeping the start of the body in the error for diagnosis.
pub(crate) fn decode<T: DeserializeOwned>(operation: &'static str, response: &HttpResponse) -> HacResult<T> {
    serde_json::from_str(&response.body)
        .map_err(|e| HacError::invalid_response(operation, format!("{e}. Body: {}", preview(&response.body))))
}

fn preview(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_base_urls() {
        let auth = AuthHandler::basic("admin", "nimda");
        let err = HacClient::new(ClientOptions::new("not a url"), auth.clone(), None)
            .err()
            .unwrap();
        assert!(matches!(err, HacError::Config(_)));
        let err = HacClient::new(ClientOptions::new("ftp://host"), auth.clone(), None)
            .err()
            .unwrap();
        assert!(matches!(err, HacError::Config(_)));
    }

    #[tokio::test]
    async fn trims_trailing_slash() {
        let client = HacClient::new(
            ClientOptions::new("https://localhost:9002/"),
            AuthHandler::basic("admin", "nimda"),
            None,
        )
        .unwrap();
        assert_eq!(client.url("/hac/"), "https://localhost:9002/hac/");
        assert_eq!(client.session_key().base_url, "https://localhost:9002");
        assert!(client.current_session().await.is_none());
        assert!(client.session_store().is_none());
    }

    #[test]
    fn preview_is_char_safe() {
        let body = "é".repeat(600);
        assert_eq!(preview(&body).chars().count(), 500);
    }
}
