//! In-process stand-in for the console: Spring-style form login, CSRF checks and the
//! JSON/HTML endpoints the client drives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Json, Query, State};
use axum::http::header::{COOKIE, REFERER, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use hac_client::{AuthHandler, ClientOptions, HacClient, SessionStore};
use serde_json::{Value, json};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "nimda";
pub const ENVIRONMENT: &str = "test";

/// Session and token handed out with the login form.
pub const ANON_SESSION: &str = "S1";
pub const ANON_CSRF: &str = "T1";
/// Session and token after a login that rotates the session id.
pub const ROTATED_SESSION: &str = "S2";
pub const ROTATED_CSRF: &str = "T2";
pub const ROUTE: &str = "ROUTE=R1";

type Fields = HashMap<String, String>;

pub struct FakeState {
    pub rotate_session: AtomicBool,
    pub omit_csrf: AtomicBool,
    pub login_posts: AtomicUsize,
    pub update_page_visited: AtomicBool,
    /// Authenticated session id -> expected CSRF token.
    sessions: Mutex<HashMap<String, String>>,
    /// Status returned by every authenticated endpoint once the session checks pass.
    pub forced_status: Mutex<Option<StatusCode>>,
    pub pending_status: Mutex<Option<StatusCode>>,
    /// Status for the next authenticated visit to the console root, used once.
    pub console_status: Mutex<Option<StatusCode>>,
    /// Token announced through `X-CSRF-TOKEN` on the next script call.
    pub next_csrf: Mutex<Option<String>>,
    pub script_response: Mutex<Value>,
    pub query_response: Mutex<Value>,
    pub impex_page: Mutex<String>,
    pub update_data: Mutex<Value>,
    pub pending_patches: Mutex<Value>,
    pub update_response: Mutex<Value>,
    pub update_log: Mutex<Value>,
    pub forms: Mutex<Vec<(&'static str, Fields)>>,
    pub update_payloads: Mutex<Vec<Value>>,
    pub data_referers: Mutex<Vec<Option<String>>>,
    pub log_queries: Mutex<Vec<Fields>>,
}

impl FakeState {
    fn new() -> Self {
        Self {
            rotate_session: AtomicBool::new(false),
            omit_csrf: AtomicBool::new(false),
            login_posts: AtomicUsize::new(0),
            update_page_visited: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
            forced_status: Mutex::new(None),
            pending_status: Mutex::new(None),
            console_status: Mutex::new(None),
            next_csrf: Mutex::new(None),
            script_response: Mutex::new(json!({
                "outputText": "hello\n",
                "executionResult": "42",
                "stacktraceText": "",
                "executionTime": 12
            })),
            query_response: Mutex::new(json!({
                "headers": ["PK", "code"],
                "resultList": [["8796093054980", "electronics"], ["8796093087748", null]],
                "resultCount": 2,
                "executionTime": 7,
                "exception": null
            })),
            impex_page: Mutex::new(
                r#"<html><body><div class="impex-result"><pre>Import finished successfully</pre></div></body></html>"#
                    .into(),
            ),
            update_data: Mutex::new(json!({ "isInitializing": false, "projectDatas": [] })),
            pending_patches: Mutex::new(json!({})),
            update_response: Mutex::new(json!({ "success": true, "log": "Starting update<br/>Update finished" })),
            update_log: Mutex::new(json!({ "log": "Creating types<br>Update finished" })),
            forms: Mutex::new(Vec::new()),
            update_payloads: Mutex::new(Vec::new()),
            data_referers: Mutex::new(Vec::new()),
            log_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set<T>(&self, slot: &Mutex<T>, value: T) {
        *slot.lock().unwrap() = value;
    }

    pub fn logins(&self) -> usize {
        self.login_posts.load(Ordering::SeqCst)
    }

    /// Forms received on `path`, oldest first.
    pub fn forms_for(&self, path: &str) -> Vec<Fields> {
        self.forms
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == path)
            .map(|(_, form)| form.clone())
            .collect()
    }

    fn authenticate(&self, session_id: &str, token: &str) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), token.to_string());
    }

    fn token_for(&self, session_id: &str) -> Option<String> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// 401 without a known session, 403 on a CSRF mismatch, then any forced status.
    fn authorize(&self, headers: &HeaderMap) -> Result<String, StatusCode> {
        let session_id = session_cookie(headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let expected = self.token_for(&session_id).ok_or(StatusCode::UNAUTHORIZED)?;
        let sent = headers.get("x-csrf-token").and_then(|v| v.to_str().ok());
        if sent != Some(expected.as_str()) {
            return Err(StatusCode::FORBIDDEN);
        }
        if let Some(status) = *self.forced_status.lock().unwrap() {
            return Err(status);
        }
        Ok(session_id)
    }

    fn record(&self, path: &'static str, form: Fields) {
        self.forms.lock().unwrap().push((path, form));
    }
}

pub struct FakeConsole {
    pub url: String,
    pub state: Arc<FakeState>,
}

impl FakeConsole {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::new());
        let app = Router::new()
            .route("/hac/", get(root))
            .route("/hac/login", get(root))
            .route("/hac/j_spring_security_check", post(login_check))
            .route("/hac/console/scripting/execute", post(script))
            .route("/hac/console/flexsearch/execute", post(flexsearch))
            .route("/hac/console/impex/import", post(impex))
            .route("/hac/platform/update", get(update_page))
            .route("/hac/platform/init/data/", get(update_data))
            .route("/hac/platform/init/pendingPatches", get(pending_patches))
            .route("/hac/platform/init/execute", post(execute_update))
            .route("/hac/initlog/log", get(update_log))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn client(&self, store: Option<SessionStore>) -> HacClient {
        self.client_as(PASSWORD, store)
    }

    pub fn client_as(&self, password: &str, store: Option<SessionStore>) -> HacClient {
        let options = ClientOptions {
            environment: ENVIRONMENT.into(),
            timeout: Duration::from_secs(5),
            ..ClientOptions::new(format!("{}/", self.url))
        };
        HacClient::new(options, AuthHandler::basic(USERNAME, password), store).unwrap()
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("JSESSIONID=").map(str::to_string))
}

pub fn login_page(with_csrf: bool) -> String {
    let csrf = if with_csrf {
        format!(r#"<input type="hidden" name="_csrf" value="{ANON_CSRF}" />"#)
    } else {
        String::new()
    };
    format!(
        r#"<html><body><form action="/hac/j_spring_security_check" method="POST">
<input type="text" name="j_username" /><input type="password" name="j_password" />{csrf}
</form></body></html>"#
    )
}

fn console_page(title: &str, token: &str) -> String {
    format!(
        r#"<html><head><meta name="_csrf" content="{token}" /><meta name="_csrf_header" content="X-CSRF-TOKEN" />
<title>{title}</title></head><body><h1>{title}</h1></body></html>"#
    )
}

async fn root(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_cookie(&headers).and_then(|id| state.token_for(&id)) {
        if let Some(status) = state.console_status.lock().unwrap().take() {
            return status.into_response();
        }
        return Html(console_page("Administration Console", &token)).into_response();
    }
    (
        AppendHeaders([
            (SET_COOKIE, format!("JSESSIONID={ANON_SESSION}; Path=/hac; HttpOnly")),
            (SET_COOKIE, format!("{ROUTE}; Path=/")),
        ]),
        Html(login_page(!state.omit_csrf.load(Ordering::SeqCst))),
    )
        .into_response()
}

async fn login_check(State(state): State<Arc<FakeState>>, headers: HeaderMap, Form(form): Form<Fields>) -> Response {
    state.login_posts.fetch_add(1, Ordering::SeqCst);
    let field = |name: &str| form.get(name).map(String::as_str);
    let accepted = session_cookie(&headers).as_deref() == Some(ANON_SESSION)
        && field("j_username") == Some(USERNAME)
        && field("j_password") == Some(PASSWORD)
        && field("_csrf") == Some(ANON_CSRF);
    if !accepted {
        return Redirect::to("/hac/login?login_error=1").into_response();
    }

    if state.rotate_session.load(Ordering::SeqCst) {
        state.authenticate(ROTATED_SESSION, ROTATED_CSRF);
        return (
            AppendHeaders([(SET_COOKIE, format!("JSESSIONID={ROTATED_SESSION}; Path=/hac; HttpOnly"))]),
            Redirect::to("/hac/"),
        )
            .into_response();
    }
    state.authenticate(ANON_SESSION, ANON_CSRF);
    Redirect::to("/hac/").into_response()
}

async fn script(State(state): State<Arc<FakeState>>, headers: HeaderMap, Form(form): Form<Fields>) -> Response {
    let session_id = match state.authorize(&headers) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    state.record("script", form);
    let body = Json(state.script_response.lock().unwrap().clone());

    let rotated = state.next_csrf.lock().unwrap().take();
    match rotated {
        Some(token) => {
            state.authenticate(&session_id, &token);
            ([("x-csrf-token", token)], body).into_response()
        }
        None => body.into_response(),
    }
}

async fn flexsearch(State(state): State<Arc<FakeState>>, headers: HeaderMap, Form(form): Form<Fields>) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    state.record("flexsearch", form);
    Json(state.query_response.lock().unwrap().clone()).into_response()
}

async fn impex(State(state): State<Arc<FakeState>>, headers: HeaderMap, Form(form): Form<Fields>) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    state.record("impex", form);
    Html(state.impex_page.lock().unwrap().clone()).into_response()
}

async fn update_page(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    let session_id = match state.authorize(&headers) {
        Ok(id) => id,
        Err(status) => return status.into_response(),
    };
    state.update_page_visited.store(true, Ordering::SeqCst);
    let token = state.token_for(&session_id).unwrap_or_default();
    Html(console_page("Update", &token)).into_response()
}

async fn update_data(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    let referer = headers.get(REFERER).and_then(|v| v.to_str().ok()).map(str::to_string);
    state.data_referers.lock().unwrap().push(referer);
    // Patch metadata only exists once the update page has been rendered.
    if !state.update_page_visited.load(Ordering::SeqCst) {
        return Json(json!({ "isInitializing": false, "projectDatas": [] })).into_response();
    }
    Json(state.update_data.lock().unwrap().clone()).into_response()
}

async fn pending_patches(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    if let Some(status) = *state.pending_status.lock().unwrap() {
        return status.into_response();
    }
    Json(state.pending_patches.lock().unwrap().clone()).into_response()
}

async fn execute_update(State(state): State<Arc<FakeState>>, headers: HeaderMap, Json(payload): Json<Value>) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    state.update_payloads.lock().unwrap().push(payload);
    Json(state.update_response.lock().unwrap().clone()).into_response()
}

async fn update_log(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<Fields>,
) -> Response {
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    state.log_queries.lock().unwrap().push(query);
    Json(state.update_log.lock().unwrap().clone()).into_response()
}
