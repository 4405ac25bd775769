// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the store, the HTTP core, and the refresh coordinator.

/// Failures of the encryption boundary.
///
/// Every variant is terminal for the value involved: callers never fall back
/// to plaintext or to partially decrypted data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// No key was configured, or it is shorter than the required minimum.
    #[error("encryption key missing or shorter than {min} bytes")]
    InvalidKey { min: usize },
    /// Serialization or sealing failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),
    /// Malformed, tampered, or foreign-key ciphertext.
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Errors surfaced by the session client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The envelope carried a `code` other than 200.
    #[error("{message}")]
    Domain { code: i64, message: String },
    /// Non-2xx transport status, rendered through the status table.
    #[error("{message}")]
    Http { status: u16, message: String, detail: Option<String> },
    /// No response was received at all.
    #[error("network error: {0}")]
    Network(String),
    /// Credential renewal was exhausted; the session has been cleared.
    #[error("authentication required: {0}")]
    Auth(String),
    /// The response body was not the expected JSON shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Build an HTTP error from a status code and the server's own message, if any.
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        Self::Http { status, message: status_message(status), detail }
    }

    /// Machine-readable kind, used for structured logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain { .. } => "DOMAIN",
            Self::Http { .. } => "HTTP",
            Self::Network(_) => "NETWORK",
            Self::Auth(_) => "AUTH",
            Self::Decode(_) => "DECODE",
            Self::Crypto(_) => "CRYPTO",
            Self::Config(_) => "CONFIG",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// HTTP status carried by the error, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), None),
            None => Self::Network(e.to_string()),
        }
    }
}

/// Human-readable message for a transport status code.
pub fn status_message(status: u16) -> String {
    let canned = match status {
        400 => "bad request parameters",
        401 => "login expired, please sign in again",
        403 => "access denied",
        404 => "resource not found",
        405 => "method not allowed",
        500 => "server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        other => return format!("request failed ({other})"),
    };
    canned.to_owned()
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
