use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// The access/refresh token pair returned by login and registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub username: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    fn new(credentials: Credentials, username: Option<String>) -> Self {
        Self {
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            username,
            saved_at: Utc::now(),
        }
    }

    /// Both tokens must be non-empty for the session to count as logged in.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// Client-side authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn,
}

/// Holds the single credential pair for one client, optionally persisted
/// to `session.json` so it survives restarts.
///
/// Disk writes happen before the in-memory copy is replaced, so a failed
/// write never leaves a half-updated session behind.
#[derive(Debug)]
pub struct Session {
    path: Option<PathBuf>,
    data: Option<SessionData>,
}

impl Session {
    /// Create a session persisted under `cache_dir`. Call [`Session::load`]
    /// to pick up a previously saved credential pair.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: Some(cache_dir.join(SESSION_FILE)),
            data: None,
        }
    }

    /// Create a session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: None,
        }
    }

    /// Load session from disk. Returns whether a usable credential pair was found.
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = self.path.as_ref() else {
            return Ok(self.data.is_some());
        };
        if !path.exists() {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_complete() {
            self.data = Some(data);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Replace the credential pair, persisting it first.
    pub fn store(&mut self, credentials: Credentials, username: Option<String>) -> Result<()> {
        let data = SessionData::new(credentials, username);
        self.write(&data)?;
        self.data = Some(data);
        Ok(())
    }

    /// Swap in a renewed access token. The refresh token is kept as-is.
    pub fn set_access_token(&mut self, access_token: String) -> Result<()> {
        let Some(current) = self.data.as_ref() else {
            anyhow::bail!("No session to update");
        };
        let updated = SessionData {
            access_token,
            saved_at: Utc::now(),
            ..current.clone()
        };
        self.write(&updated)?;
        self.data = Some(updated);
        Ok(())
    }

    /// Clear session data. Safe to call when already logged out.
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        if let Some(path) = self.path.as_ref() {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove session file")?;
            }
        }
        Ok(())
    }

    pub fn access_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.refresh_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn username(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.username.as_deref())
    }

    pub fn state(&self) -> AuthState {
        match (self.access_token(), self.refresh_token()) {
            (Some(_), Some(_)) => AuthState::LoggedIn,
            _ => AuthState::LoggedOut,
        }
    }

    fn write(&self, data: &SessionData) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
