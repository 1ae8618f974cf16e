//! API client for communicating with the Workwise REST API.
//!
//! This module provides the `ApiClient` struct, which owns the session
//! tokens and makes authenticated requests for department, machine, job
//! and notification data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthEvent, AuthState, Credentials, Session};
use crate::config::Config;
use crate::models::{
    Department, DepartmentInput, Job, Machine, MachineInput, MaintenanceTicket, NewAccount,
    Notification, User,
};
use crate::utils::MutexExt;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/auth/token/";
const REGISTER_PATH: &str = "/auth/register/";
const REFRESH_PATH: &str = "/auth/token/refresh/";
const USERS_PATH: &str = "/auth/users/";

const DEPARTMENTS_PATH: &str = "/departments/departments/";
const MACHINES_PATH: &str = "/machines/machines/";
const TICKETS_PATH: &str = "/machines/tickets/";
const JOBS_PATH: &str = "/jobs/jobs/";
const NOTIFICATIONS_PATH: &str = "/notifications/notifications/";

/// Capacity of the auth event channel. Slow subscribers only miss old events.
const AUTH_EVENT_BUFFER_SIZE: usize = 16;

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Outcome of the last failed refresh, handed to requests that queued
/// behind it.
#[derive(Debug, Clone)]
enum FailedRefresh {
    LoggedOut,
    Failed { status: Option<u16>, reason: String },
}

impl FailedRefresh {
    fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::Unauthenticated => FailedRefresh::LoggedOut,
            ApiError::RefreshFailed { status, reason } => FailedRefresh::Failed {
                status: *status,
                reason: reason.clone(),
            },
            other => FailedRefresh::Failed {
                status: None,
                reason: other.to_string(),
            },
        }
    }

    fn to_error(&self) -> ApiError {
        match self {
            FailedRefresh::LoggedOut => ApiError::Unauthenticated,
            FailedRefresh::Failed { status, reason } => ApiError::RefreshFailed {
                status: *status,
                reason: reason.clone(),
            },
        }
    }
}

/// State guarded by the refresh gate.
#[derive(Debug, Default)]
struct RefreshLedger {
    last_failure: Option<FailedRefresh>,
}

/// API client for the Workwise backend.
///
/// Clone is cheap: clones share the connection pool, the session and the
/// refresh gate, so a 401 seen by several clones at once triggers a single
/// refresh call.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    session: Arc<Mutex<Session>>,
    refresh_gate: Arc<tokio::sync::Mutex<RefreshLedger>>,
    /// Completed refresh attempts, for spotting one that finished while we queued.
    refresh_attempts: Arc<AtomicU64>,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:8000/api`).
    /// `timeout` bounds every individual HTTP call.
    pub fn new(base_url: &str, timeout: Duration, session: Session) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_BUFFER_SIZE);

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            session: Arc::new(Mutex::new(session)),
            refresh_gate: Arc::new(tokio::sync::Mutex::new(RefreshLedger::default())),
            refresh_attempts: Arc::new(AtomicU64::new(0)),
            events,
        })
    }

    pub fn from_config(config: &Config, session: Session) -> Result<Self, ApiError> {
        Self::new(&config.effective_api_url(), config.request_timeout(), session)
    }

    /// Receive login/logout transitions and login-required signals.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.session().state()
    }

    pub fn username(&self) -> Option<String> {
        self.session().username().map(str::to_owned)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock_or_recover()
    }

    fn access_token(&self) -> Option<String> {
        self.session().access_token().map(str::to_owned)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ===== Session Lifecycle =====

    /// Exchange username and password for a token pair and store it,
    /// replacing any previous session.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| {
                error!(username, error = %e, "Login request failed");
                ApiError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(username, status = status.as_u16(), "Login rejected");
            return Err(ApiError::AuthenticationFailed {
                status: status.as_u16(),
                body: ApiError::truncate_body(&body),
            });
        }

        let credentials = Self::parse_token_pair(response).await?;
        self.install(credentials, username)?;
        info!(username, "Logged in");
        Ok(())
    }

    /// Create an account. A successful registration logs the new user in.
    pub async fn register(&self, account: &NewAccount) -> Result<(), ApiError> {
        let username = account.username.as_str();
        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(account)
            .send()
            .await
            .map_err(|e| {
                error!(username, error = %e, "Registration request failed");
                ApiError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(username, status = status.as_u16(), "Registration rejected");
            return Err(ApiError::RegistrationFailed {
                status: status.as_u16(),
                body: ApiError::truncate_body(&body),
            });
        }

        let credentials = Self::parse_token_pair(response).await?;
        self.install(credentials, username)?;
        info!(username, "Registered and logged in");
        Ok(())
    }

    /// Forget both tokens. Calling this while logged out is a no-op.
    pub fn logout(&self) -> Result<(), ApiError> {
        let was_logged_in = {
            let mut session = self.session();
            let was_logged_in = session.state() == AuthState::LoggedIn;
            session.clear().map_err(ApiError::storage)?;
            was_logged_in
        };
        if was_logged_in {
            info!("Logged out");
            self.emit(AuthEvent::LoggedOut);
        }
        Ok(())
    }

    async fn parse_token_pair(response: Response) -> Result<Credentials, ApiError> {
        let tokens: TokenPairResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))?;
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            return Err(ApiError::InvalidResponse(
                "token response is missing a token".to_string(),
            ));
        }
        Ok(Credentials {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
        })
    }

    fn install(&self, credentials: Credentials, username: &str) -> Result<(), ApiError> {
        self.session()
            .store(credentials, Some(username.to_string()))
            .map_err(ApiError::storage)?;
        self.emit(AuthEvent::LoggedIn);
        Ok(())
    }

    /// Drop the session after an unrecoverable refresh failure, but only if
    /// it still holds `refresh_token`. A login that landed in the meantime
    /// is left alone.
    fn expire_session(&self, refresh_token: Option<&str>) {
        let cleared = {
            let mut session = self.session();
            if session.refresh_token() != refresh_token {
                false
            } else {
                if let Err(e) = session.clear() {
                    warn!(error = %e, "Failed to clear session after refresh failure");
                }
                true
            }
        };
        if cleared {
            self.emit(AuthEvent::LoginRequired);
        }
    }

    // ===== Token Refresh =====

    /// Mint a new access token from the stored refresh token.
    ///
    /// Only the access token is replaced. On failure nothing is cleared;
    /// that decision belongs to the caller.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let mut ledger = self.refresh_gate.lock().await;
        let stored = self.session().refresh_token().map(str::to_owned);
        let Some(refresh_token) = stored else {
            warn!("No refresh token stored, login required");
            self.emit(AuthEvent::LoginRequired);
            return Err(ApiError::Unauthenticated);
        };
        self.refresh_locked(&mut ledger, &refresh_token).await
    }

    /// Refresh on behalf of a request rejected while using `stale`.
    ///
    /// Requests queued behind an attempt that finished while they waited
    /// take that attempt's outcome: the renewed token, or the same failure.
    /// Only the task that made the attempt decides whether the session ends.
    async fn refresh_after(&self, stale: &str) -> Result<String, ApiError> {
        let attempts_seen = self.refresh_attempts.load(Ordering::SeqCst);
        let mut ledger = self.refresh_gate.lock().await;

        if let Some(current) = self.access_token() {
            if current != stale {
                debug!("Access token already renewed by a concurrent request");
                return Ok(current);
            }
        }
        if self.refresh_attempts.load(Ordering::SeqCst) != attempts_seen {
            if let Some(failure) = ledger.last_failure.as_ref() {
                debug!("Reusing outcome of the refresh attempt that just failed");
                return Err(failure.to_error());
            }
        }

        let stored = self.session().refresh_token().map(str::to_owned);
        let Some(refresh_token) = stored else {
            warn!("No refresh token stored, login required");
            self.expire_session(None);
            return Err(ApiError::Unauthenticated);
        };

        let result = self.refresh_locked(&mut ledger, &refresh_token).await;
        match &result {
            // The server refused the refresh token itself: the session is over.
            Err(ApiError::RefreshFailed {
                status: Some(_), ..
            }) => self.expire_session(Some(refresh_token.as_str())),
            Err(ApiError::Unauthenticated) => self.emit(AuthEvent::LoginRequired),
            _ => {}
        }
        result
    }

    /// Caller must hold `refresh_gate` (passed in as `ledger`).
    async fn refresh_locked(
        &self,
        ledger: &mut RefreshLedger,
        refresh_token: &str,
    ) -> Result<String, ApiError> {
        let result = match self.request_access_token(refresh_token).await {
            Ok(access) => self.apply_access_token(refresh_token, access),
            Err(e) => Err(e),
        };

        ledger.last_failure = result.as_ref().err().map(FailedRefresh::from_error);
        self.refresh_attempts.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn request_access_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Token refresh request failed");
                ApiError::RefreshFailed {
                    status: None,
                    reason: format!("network error: {}", e),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token refresh rejected");
            return Err(ApiError::RefreshFailed {
                status: Some(status.as_u16()),
                reason: ApiError::truncate_body(&body),
            });
        }

        let renewed: RefreshResponse = response.json().await.map_err(|e| ApiError::RefreshFailed {
            status: None,
            reason: format!("invalid refresh response: {}", e),
        })?;
        if renewed.access.is_empty() {
            return Err(ApiError::RefreshFailed {
                status: None,
                reason: "refresh response has an empty access token".to_string(),
            });
        }
        Ok(renewed.access)
    }

    /// Store a renewed access token, provided the session still belongs to
    /// the refresh token that minted it.
    fn apply_access_token(&self, refresh_token: &str, access: String) -> Result<String, ApiError> {
        let mut session = self.session();
        match session.refresh_token() {
            Some(current) if current == refresh_token => {}
            // A logout that raced the refresh wins.
            None => return Err(ApiError::Unauthenticated),
            Some(_) => {
                info!("Session replaced during refresh, discarding renewed token");
                return Err(ApiError::RefreshFailed {
                    status: None,
                    reason: "session replaced during refresh".to_string(),
                });
            }
        }
        session
            .set_access_token(access.clone())
            .map_err(ApiError::storage)?;
        info!("Access token refreshed");
        Ok(access)
    }

    // ===== Authenticated Requests =====

    /// Send an authenticated request and return the parsed JSON body, or
    /// `None` when the server answered without content (e.g. 204).
    ///
    /// A 401 triggers one refresh and one retry; whatever the retry returns
    /// is final. The session is cleared only when the server rejects the
    /// refresh token; network trouble during the refresh leaves it intact.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        let Some(token) = self.access_token() else {
            warn!(%method, path, "No access token, login required");
            self.emit(AuthEvent::LoginRequired);
            return Err(ApiError::Unauthenticated);
        };

        let mut response = self.dispatch(&method, path, body.as_ref(), &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(%method, path, "Access token rejected, refreshing");
            let renewed = match self.refresh_after(&token).await {
                Ok(renewed) => renewed,
                Err(e) => {
                    error!(%method, path, error = %e, "Could not recover from 401");
                    return Err(e);
                }
            };
            response = self.dispatch(&method, path, body.as_ref(), &renewed).await?;
        }

        Self::read_body(&method, path, response).await
    }

    /// Like [`ApiClient::send`], deserializing the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        match self.send(method, path, body).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                warn!(path, error = %e, "Unexpected response shape");
                ApiError::InvalidResponse(format!("{}: {}", path, e))
            }),
            None => Err(ApiError::InvalidResponse(format!(
                "{} returned no content",
                path
            ))),
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, ApiError> {
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| {
            error!(%method, path, error = %e, "Request failed to reach server");
            ApiError::Transport(e)
        })
    }

    async fn read_body(
        method: &Method,
        path: &str,
        response: Response,
    ) -> Result<Option<Value>, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%method, path, status = status.as_u16(), "Request failed");
            return Err(ApiError::request_failed(status, &body));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    // ===== Departments =====

    pub async fn get_departments(&self) -> Result<Vec<Department>, ApiError> {
        self.send_json(Method::GET, DEPARTMENTS_PATH, None).await
    }

    pub async fn add_department(&self, department: &DepartmentInput) -> Result<Department, ApiError> {
        let body = serde_json::to_value(department)?;
        self.send_json(Method::POST, DEPARTMENTS_PATH, Some(body)).await
    }

    pub async fn update_department(
        &self,
        id: i64,
        department: &DepartmentInput,
    ) -> Result<Department, ApiError> {
        let body = serde_json::to_value(department)?;
        let path = format!("{}{}/", DEPARTMENTS_PATH, id);
        self.send_json(Method::PUT, &path, Some(body)).await
    }

    pub async fn delete_department(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("{}{}/", DEPARTMENTS_PATH, id);
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }

    // ===== Machines =====

    pub async fn get_machines(&self) -> Result<Vec<Machine>, ApiError> {
        self.send_json(Method::GET, MACHINES_PATH, None).await
    }

    pub async fn add_machine(&self, machine: &MachineInput) -> Result<Machine, ApiError> {
        let body = serde_json::to_value(machine)?;
        self.send_json(Method::POST, MACHINES_PATH, Some(body)).await
    }

    pub async fn update_machine(&self, id: i64, machine: &MachineInput) -> Result<Machine, ApiError> {
        let body = serde_json::to_value(machine)?;
        let path = format!("{}{}/", MACHINES_PATH, id);
        self.send_json(Method::PUT, &path, Some(body)).await
    }

    pub async fn delete_machine(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("{}{}/", MACHINES_PATH, id);
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }

    pub async fn get_tickets(&self) -> Result<Vec<MaintenanceTicket>, ApiError> {
        self.send_json(Method::GET, TICKETS_PATH, None).await
    }

    // ===== Jobs, Notifications, Users =====

    pub async fn get_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.send_json(Method::GET, JOBS_PATH, None).await
    }

    pub async fn get_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.send_json(Method::GET, NOTIFICATIONS_PATH, None).await
    }

    pub async fn get_users(&self) -> Result<Vec<User>, ApiError> {
        self.send_json(Method::GET, USERS_PATH, None).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        let path = format!("{}{}/", USERS_PATH, id);
        self.send_json(Method::GET, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, Duration::from_secs(5), Session::in_memory()).unwrap()
    }

    #[test]
    fn test_url_joins_paths() {
        let api = client("http://localhost:8000/api/");
        assert_eq!(api.base_url(), "http://localhost:8000/api");
        assert_eq!(
            api.url(DEPARTMENTS_PATH),
            "http://localhost:8000/api/departments/departments/"
        );
        assert_eq!(api.url("jobs/jobs/"), "http://localhost:8000/api/jobs/jobs/");
    }

    #[test]
    fn test_new_client_is_logged_out() {
        let api = client("http://localhost:8000/api");
        assert_eq!(api.state(), AuthState::LoggedOut);
        assert!(api.username().is_none());
    }

    #[test]
    fn test_logout_when_logged_out_emits_nothing() {
        let api = client("http://localhost:8000/api");
        let mut events = api.subscribe();
        api.logout().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_session() {
        let mut session = Session::in_memory();
        session
            .store(
                Credentials {
                    access_token: "a".to_string(),
                    refresh_token: "r".to_string(),
                },
                Some("alice".to_string()),
            )
            .unwrap();
        let api = ApiClient::new("http://localhost", Duration::from_secs(5), session).unwrap();
        let other = api.clone();

        other.logout().unwrap();
        assert_eq!(api.state(), AuthState::LoggedOut);
    }

    #[tokio::test]
    async fn test_send_without_token_makes_no_request() {
        // Port 9 (discard) is never contacted: the token check comes first.
        let api = client("http://127.0.0.1:9/api");
        let mut events = api.subscribe();

        let err = api.send(Method::GET, DEPARTMENTS_PATH, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
        assert_eq!(events.try_recv().unwrap(), AuthEvent::LoginRequired);
    }

    #[test]
    fn test_parse_token_pair_json() {
        let tokens: TokenPairResponse =
            serde_json::from_str(r#"{"access":"a1","refresh":"r1"}"#).unwrap();
        assert_eq!(tokens.access, "a1");
        assert_eq!(tokens.refresh, "r1");
        assert!(serde_json::from_str::<RefreshResponse>(r#"{"refresh":"r1"}"#).is_err());
    }
}
