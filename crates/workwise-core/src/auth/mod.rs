//! Authentication state for the API client.
//!
//! This module provides:
//! - `Session`: the persisted access/refresh token pair
//! - `CredentialStore`: optional OS-level password storage via keyring
//! - `AuthEvent`: notifications the client publishes on login/logout and
//!   whenever the user has to be sent back to the login screen
//!
//! Tokens carry no client-side expiry; an expired access token is only
//! discovered when the backend answers 401.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{AuthState, Credentials, Session, SessionData};

/// Published by `ApiClient` on authentication transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
    /// No usable credentials remain; the front end should show its login entry point.
    LoginRequired,
}
