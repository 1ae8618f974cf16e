use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    Unauthenticated,

    #[error("Login failed (status {status}): {body}")]
    AuthenticationFailed { status: u16, body: String },

    #[error("Registration failed (status {status}): {body}")]
    RegistrationFailed { status: u16, body: String },

    /// `status` is set when the refresh endpoint answered with a non-2xx.
    #[error("Token refresh failed: {reason}")]
    RefreshFailed { status: Option<u16>, reason: String },

    #[error("Request failed (status {status}): {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub(crate) fn request_failed(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::RequestFailed {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthenticationFailed { status, .. }
            | ApiError::RegistrationFailed { status, .. }
            | ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::RefreshFailed { status, .. } => *status,
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the caller should send the user back to the login screen.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated | ApiError::RefreshFailed { .. }
        )
    }
}
