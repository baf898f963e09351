//! Session and load-balancer cookies captured from `Set-Cookie` headers.
//!
//! The client does not keep a general cookie jar: only `JSESSIONID` and `ROUTE` matter to
//! the console, and both are replayed verbatim through an explicit `Cookie` header.

use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};

pub const SESSION_COOKIE: &str = "JSESSIONID";
pub const ROUTE_COOKIE: &str = "ROUTE";

/// Cookies threaded through every authenticated request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// Bare `JSESSIONID` value.
    pub session_id: Option<String>,
    /// Full `ROUTE=value` pair, passed through untouched.
    pub route: Option<String>,
}

impl SessionCookies {
    pub fn new(session_id: Option<String>, route: Option<String>) -> Self {
        Self { session_id, route }
    }

    /// Inspect every `Set-Cookie` header (not just the last one) and keep the newest values.
    /// Returns true when anything changed.
    pub fn absorb(&mut self, headers: &HeaderMap) -> bool {
        let mut changed = false;
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else { continue };
            let Some((name, value)) = parse_set_cookie(raw) else { continue };
            // An empty value is the server expiring the cookie, not a new session.
            if value.is_empty() {
                continue;
            }
            match name {
                SESSION_COOKIE if self.session_id.as_deref() != Some(value) => {
                    self.session_id = Some(value.to_string());
                    changed = true;
                }
                ROUTE_COOKIE => {
                    let pair = format!("{ROUTE_COOKIE}={value}");
                    if self.route.as_deref() != Some(pair.as_str()) {
                        self.route = Some(pair);
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }

    /// `Cookie` header value, e.g. `JSESSIONID=abc; ROUTE=r1`.
    pub fn header_value(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(id) = self.session_id.as_deref().filter(|id| !id.is_empty()) {
            parts.push(format!("{SESSION_COOKIE}={id}"));
        }
        if let Some(route) = self.route.as_deref().filter(|r| !r.is_empty()) {
            parts.push(route.to_string());
        }
        if parts.is_empty() { None } else { Some(parts.join("; ")) }
    }

    /// Header map carrying the `Cookie` header (empty when there is nothing to send).
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.header_value().and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(COOKIE, value);
        }
        headers
    }
}

/// Split `NAME=value; Path=/; HttpOnly` into `("NAME", "value")`.
pub fn parse_set_cookie(raw: &str) -> Option<(&str, &str)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cookies(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(SET_COOKIE, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn reads_every_set_cookie_header() {
        let mut cookies = SessionCookies::default();
        let changed = cookies.absorb(&set_cookies(&["JSESSIONID=S1; Path=/", "ROUTE=R1; Path=/"]));
        assert!(changed);
        assert_eq!(cookies.session_id.as_deref(), Some("S1"));
        assert_eq!(cookies.route.as_deref(), Some("ROUTE=R1"));
        assert_eq!(cookies.header_value().as_deref(), Some("JSESSIONID=S1; ROUTE=R1"));
    }

    #[test]
    fn later_values_replace_earlier_ones() {
        let mut cookies = SessionCookies::new(Some("S1".into()), Some("ROUTE=R1".into()));
        assert!(!cookies.absorb(&set_cookies(&["ROUTE=R1; Path=/"])));
        assert!(cookies.absorb(&set_cookies(&["JSESSIONID=S2; Path=/hac; HttpOnly"])));
        assert_eq!(cookies.session_id.as_deref(), Some("S2"));
        assert_eq!(cookies.route.as_deref(), Some("ROUTE=R1"));
    }

    #[test]
    fn ignores_expired_and_foreign_cookies() {
        let mut cookies = SessionCookies::new(Some("S1".into()), None);
        assert!(!cookies.absorb(&set_cookies(&[
            "JSESSIONID=; Max-Age=0; Path=/",
            "remember-me=xyz; Path=/",
        ])));
        assert_eq!(cookies.session_id.as_deref(), Some("S1"));
    }

    #[test]
    fn empty_jar_sends_no_cookie_header() {
        assert_eq!(SessionCookies::default().header_value(), None);
        assert!(SessionCookies::default().headers().is_empty());
    }

    #[test]
    fn parse_pair() {
        assert_eq!(parse_set_cookie("A=b=c; Path=/"), Some(("A", "b=c")));
        assert_eq!(parse_set_cookie("novalue"), None);
    }
}
