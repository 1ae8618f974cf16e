//! Workwise core library.
//!
//! Authenticated client for the Workwise facility dashboard API: token
//! storage, bearer authentication, and transparent refresh-and-retry when
//! the access token expires.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthEvent, AuthState, Credentials, Session};
pub use config::Config;
