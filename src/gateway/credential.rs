//! Access token loading
//!
//! The login flow writes the token response verbatim to a JSON file; the
//! crawl reads it once at startup and only uses the access token string.

use chrono::Utc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading the access token. All of them are fatal.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Token file {path} does not contain an access token")]
    MissingToken { path: PathBuf },

    #[error("Token file {path} records an unsuccessful login")]
    Rejected { path: PathBuf },
}

/// Token response as written by the login flow
#[derive(Debug, Clone, Deserialize)]
pub struct AdminToken {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expire: String,
    #[serde(default)]
    pub expire_timestamp: i64,
}

impl AdminToken {
    /// Whether the recorded expiry lies in the past. Tokens without an
    /// expiry timestamp are never considered expired.
    pub fn is_expired(&self) -> bool {
        self.expire_timestamp > 0 && self.expire_timestamp <= Utc::now().timestamp()
    }
}

/// Reads the token file and returns the access token
///
/// An expired token is still returned: the API is the authority on
/// expiry, so this only warns.
pub fn load_access_token(path: &Path) -> Result<String, CredentialError> {
    let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let token: AdminToken =
        serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if !token.success {
        return Err(CredentialError::Rejected {
            path: path.to_path_buf(),
        });
    }

    if token.access_token.is_empty() {
        return Err(CredentialError::MissingToken {
            path: path.to_path_buf(),
        });
    }

    if token.is_expired() {
        tracing::warn!(
            expire = %token.expire,
            "Access token appears to be expired, requests may be rejected"
        );
    }

    Ok(token.access_token)
}
