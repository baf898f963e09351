//! Credentials for the console login form and the header sets sent with each request.

use std::fmt;

use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};

use super::cookies::SessionCookies;
use super::models::SessionInfo;

/// Spring Security form field names.
pub const USERNAME_FIELD: &str = "j_username";
pub const PASSWORD_FIELD: &str = "j_password";

/// Header carrying the CSRF token on every state-changing request.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

const BROWSER_USER_AGENT: &str = concat!("hac-client/", env!("CARGO_PKG_VERSION"));
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Form-login credentials, reusable for retries and re-authentication.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Supported authentication schemes.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AuthHandler {
    /// Spring Security form login.
    Basic(BasicAuth),
}

impl AuthHandler {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic(BasicAuth::new(username, password))
    }

    /// Login form fields. Safe to call any number of times.
    pub fn initial_credentials(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Basic(basic) => vec![
                (USERNAME_FIELD, basic.username.clone()),
                (PASSWORD_FIELD, basic.password.clone()),
            ],
        }
    }

    /// Per-request authentication. Form login authenticates through the session cookie,
    /// so the basic scheme leaves requests untouched.
    pub fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic(_) => request,
        }
    }

    /// Identity used to partition the session cache.
    pub fn username(&self) -> &str {
        match self {
            Self::Basic(basic) => &basic.username,
        }
    }
}

/// How a request body is encoded, which decides the content type header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    None,
    Form,
    Json,
}

/// Headers for a request made with an established session.
///
/// `xhr` marks the console's AJAX endpoints, which answer JSON only to
/// `X-Requested-With: XMLHttpRequest` callers.
pub fn session_headers(session: &SessionInfo, body: BodyKind, xhr: bool) -> HeaderMap {
    let cookies = SessionCookies::new(Some(session.session_id.clone()), session.route_cookie.clone());
    let mut headers = cookies.headers();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    match body {
        BodyKind::Form => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        }
        BodyKind::Json => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        BodyKind::None => {}
    }
    if xhr {
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
    }
    if let Ok(token) = HeaderValue::from_str(&session.csrf_token) {
        headers.insert(HeaderName::from_static("x-csrf-token"), token);
    }
    headers
}

/// Headers for the anonymous login requests: browser identity plus captured cookies.
pub fn login_headers(cookies: &SessionCookies) -> HeaderMap {
    let mut headers = cookies.headers();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers
}

/// Adds a `Referer`, which the update data endpoint checks.
pub fn with_referer(mut headers: HeaderMap, referer: &str) -> HeaderMap {
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::COOKIE;

    fn session() -> SessionInfo {
        SessionInfo {
            session_id: "S1".into(),
            csrf_token: "T1".into(),
            route_cookie: Some("ROUTE=R1".into()),
            is_authenticated: true,
        }
    }

    #[test]
    fn credentials_are_reusable() {
        let auth = AuthHandler::basic("admin", "nimda");
        for _ in 0..2 {
            assert_eq!(
                auth.initial_credentials(),
                vec![(USERNAME_FIELD, "admin".to_string()), (PASSWORD_FIELD, "nimda".to_string())]
            );
        }
        assert_eq!(auth.username(), "admin");
    }

    #[test]
    fn debug_masks_password() {
        let rendered = format!("{:?}", AuthHandler::basic("admin", "nimda"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("nimda"));
    }

    #[test]
    fn session_headers_carry_cookies_and_token() {
        let headers = session_headers(&session(), BodyKind::Form, true);
        assert_eq!(headers[COOKIE], "JSESSIONID=S1; ROUTE=R1");
        assert_eq!(headers[CSRF_HEADER], "T1");
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers[CONTENT_TYPE], FORM_CONTENT_TYPE);

        let plain = session_headers(&session(), BodyKind::None, false);
        assert!(plain.get("x-requested-with").is_none());
        assert!(plain.get(CONTENT_TYPE).is_none());
    }
}
