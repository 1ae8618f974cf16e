//! REST API client module for the Workwise backend.
//!
//! This module provides the `ApiClient` for logging in, registering, and
//! making authenticated CRUD requests against departments, machines and
//! the other dashboard resources.
//!
//! The API uses JWT bearer tokens. An expired access token is renewed with
//! the stored refresh token and the failed request is retried once.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
