//! In-process mock of the Workwise backend.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use workwise_core::{ApiClient, Credentials, Session};

pub const PASSWORD: &str = "correct-horse";
pub const REFRESH_TOKEN: &str = "refresh-1";

pub const BOB_PASSWORD: &str = "battery-staple";

pub struct Backend {
    /// Access tokens the resource endpoints accept.
    pub valid_access: Mutex<HashSet<String>>,
    /// Refresh tokens the refresh endpoint accepts.
    pub valid_refresh: Mutex<HashSet<String>>,
    pub accounts: Mutex<HashMap<String, String>>,
    /// Status the refresh endpoint answers with instead of minting a token.
    pub refresh_override: Mutex<Option<StatusCode>>,
    /// How long the refresh endpoint takes to answer.
    pub refresh_delay_ms: AtomicU64,
    /// Resource endpoints answer 401 no matter what token is sent.
    pub always_unauthorized: AtomicBool,
    pub requests: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub department_calls: AtomicUsize,
    pub seen_tokens: Mutex<Vec<String>>,
    minted: AtomicUsize,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        let mut accounts = HashMap::new();
        accounts.insert("alice".to_string(), PASSWORD.to_string());
        accounts.insert("bob".to_string(), BOB_PASSWORD.to_string());
        Arc::new(Self {
            valid_access: Mutex::new(HashSet::from(["access-0".to_string()])),
            valid_refresh: Mutex::new(HashSet::from([REFRESH_TOKEN.to_string()])),
            accounts: Mutex::new(accounts),
            refresh_override: Mutex::new(None),
            refresh_delay_ms: AtomicU64::new(50),
            always_unauthorized: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            department_calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
            minted: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn department_calls(&self) -> usize {
        self.department_calls.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }

    pub fn fail_refresh_with(&self, status: StatusCode) {
        *self.refresh_override.lock().unwrap() = Some(status);
    }

    pub fn slow_refresh(&self, delay: Duration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn mint_access(&self) -> String {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("access-{}", n);
        self.valid_access.lock().unwrap().insert(token.clone());
        token
    }

    /// Token pair for a fresh login; each account has its own refresh token.
    fn mint_pair(&self, username: &str) -> Value {
        let refresh = format!("refresh-{}", username);
        self.valid_refresh.lock().unwrap().insert(refresh.clone());
        json!({"access": self.mint_access(), "refresh": refresh})
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string();
        self.seen_tokens.lock().unwrap().push(token.clone());
        !self.always_unauthorized.load(Ordering::SeqCst)
            && self.valid_access.lock().unwrap().contains(&token)
    }
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: String,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

fn departments() -> Value {
    json!([
        {"id": 1, "name": "Assembly", "description": null,
         "created_at": "2024-10-01T08:30:00Z", "updated_at": "2024-10-01T08:30:00Z"},
        {"id": 2, "name": "Paint", "description": "Spray booths",
         "created_at": "2024-10-01T08:30:00Z", "updated_at": "2024-10-02T10:00:00Z"}
    ])
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<LoginBody>) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    let valid = backend
        .accounts
        .lock()
        .unwrap()
        .get(&body.username)
        .is_some_and(|p| *p == body.password);
    if !valid {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    Json(backend.mint_pair(&body.username)).into_response()
}

async fn register(State(backend): State<Arc<Backend>>, Json(body): Json<LoginBody>) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    {
        let mut accounts = backend.accounts.lock().unwrap();
        if accounts.contains_key(&body.username) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Username already exists"})),
            )
                .into_response();
        }
        accounts.insert(body.username.clone(), body.password);
    }
    (StatusCode::CREATED, Json(backend.mint_pair(&body.username))).into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<RefreshBody>) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Give concurrent callers time to pile up behind the first refresh.
    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let forced = *backend.refresh_override.lock().unwrap();
    if let Some(status) = forced {
        return (status, Json(json!({"detail": "Token is blacklisted"}))).into_response();
    }
    if !backend.valid_refresh.lock().unwrap().contains(&body.refresh) {
        return unauthorized();
    }
    let access = backend.mint_access();
    Json(json!({"access": access})).into_response()
}

async fn list_departments(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    backend.department_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(departments()).into_response()
}

async fn create_department(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let created = json!({
        "id": 3,
        "name": body["name"],
        "description": body.get("description").cloned().unwrap_or(Value::Null),
        "created_at": "2024-10-03T12:00:00Z",
        "updated_at": "2024-10-03T12:00:00Z"
    });
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn update_department(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if id != 1 && id != 2 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }
    Json(json!({
        "id": id,
        "name": body["name"],
        "description": body.get("description").cloned().unwrap_or(Value::Null),
        "created_at": "2024-10-01T08:30:00Z",
        "updated_at": "2024-10-03T12:00:00Z"
    }))
    .into_response()
}

async fn delete_department(
    State(backend): State<Arc<Backend>>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_machines(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        {"id": 7, "name": "Lathe", "model_number": "LX-200", "location": "Bay 3",
         "status": "operational", "last_maintenance_date": "2024-09-15"}
    ]))
    .into_response()
}

async fn list_jobs(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "<h1>Server Error (500)</h1>",
    )
        .into_response()
}

/// Answers 200 with nothing but whitespace.
async fn health(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, " \n").into_response()
}

pub fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/token/", post(login))
        .route("/api/auth/register/", post(register))
        .route("/api/auth/token/refresh/", post(refresh))
        .route(
            "/api/departments/departments/",
            get(list_departments).post(create_department),
        )
        .route(
            "/api/departments/departments/:id/",
            put(update_department).delete(delete_department),
        )
        .route("/api/machines/machines/", get(list_machines))
        .route("/api/jobs/jobs/", get(list_jobs))
        .route("/api/health/", get(health))
        .with_state(backend)
}

/// Serve the mock on an ephemeral port and return its API base URL.
pub async fn spawn(backend: Arc<Backend>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(backend)).await.unwrap();
    });
    format!("http://{}/api", addr)
}

pub fn client(base_url: &str, session: Session) -> ApiClient {
    ApiClient::new(base_url, Duration::from_secs(5), session).unwrap()
}

/// A session whose access token the backend no longer accepts.
pub fn expired_session() -> Session {
    session_with("stale-access", REFRESH_TOKEN)
}

pub fn session_with(access: &str, refresh: &str) -> Session {
    let mut session = Session::in_memory();
    session
        .store(
            Credentials {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
            },
            Some("alice".to_string()),
        )
        .unwrap();
    session
}
