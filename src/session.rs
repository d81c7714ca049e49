//! # Session — Bearer Credential Persistence
//!
//! Stores the access/refresh token pair issued by `POST /token/` in
//! `~/.greymoon/session.toml`. The pair is written on login, cleared on
//! logout, and cleared whenever any request comes back 401 — after which
//! every component sees the same "not logged in" state.
//!
//! Both tokens are opaque strings to this client. The refresh token is
//! persisted for completeness but never exercised; re-login is the
//! recovery path.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The two tokens returned by `POST /token/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// File-backed token storage. Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at the default location, `~/.greymoon/session.toml`.
    pub fn open_default() -> Result<Self, ApiError> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| ApiError::Validation("cannot determine home directory".into()))?;
        Ok(SessionStore {
            path: PathBuf::from(home).join(".greymoon").join("session.toml"),
        })
    }

    /// Store at an explicit path. Tests use this to avoid touching `$HOME`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn load(&self) -> Result<TokenPair, ApiError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|_| ApiError::Auth)?;
        toml::from_str(&content)
            .map_err(|e| ApiError::Validation(format!("corrupt session file: {}", e)))
    }

    pub fn save(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiError::Validation(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let content = toml::to_string_pretty(tokens)
            .map_err(|e| ApiError::Validation(format!("cannot encode session: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| ApiError::Validation(format!("cannot write {}: {}", self.path.display(), e)))
    }

    /// Remove the stored pair. Missing file is fine — logout is idempotent.
    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
    }

    pub fn is_logged_in(&self) -> bool {
        self.path.exists()
    }
}
