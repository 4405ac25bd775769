// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state: credential, profile, permissions, and the routes latch.

pub mod store;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Storage keys owned by the session.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
    pub const PERMISSIONS: &str = "permissions";
    pub const ROUTES_LOADED: &str = "routesLoaded";
    pub const CSRF_TOKEN: &str = "csrfToken";

    /// Every key `clear()` removes.
    pub const ALL: [&str; 6] = [TOKEN, REFRESH_TOKEN, USER, PERMISSIONS, ROUTES_LOADED, CSRF_TOKEN];
}

/// Access/refresh token pair. Expiry is unknown to the client and discovered via 401.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &token_preview(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(token_preview))
            .finish()
    }
}

/// Short, log-safe rendering of a token.
pub fn token_preview(token: &str) -> String {
    if token.chars().count() > 12 {
        format!("{}...", token.chars().take(8).collect::<String>())
    } else {
        "***".to_owned()
    }
}

/// Profile of the signed-in user as returned by `/v1/auth/me` and login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Fields this client does not model (timestamps, dept, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Capability tokens granted to the user. Only used for membership tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn new<I, S>(perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(perms.into_iter().map(Into::into).collect())
    }

    /// An empty requirement is always satisfied; an empty grant set satisfies nothing else.
    pub fn has(&self, permission: &str) -> bool {
        permission.is_empty() || self.0.contains(permission)
    }

    /// True when `required` is empty or any entry is granted.
    pub fn has_any(&self, required: &[&str]) -> bool {
        required.is_empty() || required.iter().any(|p| self.has(p))
    }

    /// True when `required` is empty or every entry is granted.
    pub fn has_all(&self, required: &[&str]) -> bool {
        required.iter().all(|p| self.has(p))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Consistent copy of the in-memory session, taken under one lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub credential: Option<Credential>,
    pub user: Option<UserProfile>,
    pub permissions: Permissions,
    pub routes_loaded: bool,
    pub csrf_token: Option<String>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

/// Outcome of the one-time decrypt-on-load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLoad {
    /// Nothing was persisted.
    Empty,
    /// A persisted session was decrypted into memory.
    Restored,
    /// Persisted state could not be decrypted and was wiped.
    Cleared,
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
