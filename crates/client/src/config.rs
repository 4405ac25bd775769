// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::MIN_KEY_LEN;
use crate::error::ClientError;

/// How a rejected credential is renewed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RenewalMode {
    /// Exchange the refresh token at the refresh endpoint.
    #[default]
    Refresh,
    /// Ask the user to sign in again.
    Interactive,
    /// Try the refresh token first; prompt if that fails.
    RefreshThenInteractive,
}

impl RenewalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Interactive => "interactive",
            Self::RefreshThenInteractive => "refresh-then-interactive",
        }
    }

    pub fn needs_prompt(&self) -> bool {
        !matches!(self, Self::Refresh)
    }
}

impl std::fmt::Display for RenewalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the session client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the admin API; request paths are appended to it.
    #[arg(long, default_value = "http://127.0.0.1:8080/api", env = "ADMINPLUS_BASE_URL")]
    pub base_url: String,

    /// Secret the storage encryption key is derived from (at least 32 bytes).
    #[arg(long, env = "ADMINPLUS_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "ADMINPLUS_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Upper bound on one credential renewal, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "ADMINPLUS_REFRESH_TIMEOUT_MS")]
    pub refresh_timeout_ms: u64,

    /// Extra time the interactive modes give the user to sign in again, in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "ADMINPLUS_PROMPT_TIMEOUT_MS")]
    pub prompt_timeout_ms: u64,

    /// Renewal strategy used when a request is rejected with 401.
    #[arg(long, value_enum, default_value_t = RenewalMode::Refresh, env = "ADMINPLUS_RENEWAL")]
    pub renewal: RenewalMode,

    /// Unauthenticated refresh-token exchange endpoint.
    #[arg(long, default_value = "/auth/refresh", env = "ADMINPLUS_REFRESH_PATH")]
    pub refresh_path: String,

    /// Login endpoint.
    #[arg(long, default_value = "/v1/auth/login", env = "ADMINPLUS_LOGIN_PATH")]
    pub login_path: String,

    /// Endpoint returning the user's authorization-scoped menu tree.
    #[arg(long, default_value = "/v1/sys/menus/user/tree", env = "ADMINPLUS_MENU_PATH")]
    pub menu_path: String,

    /// Anti-forgery token bootstrap endpoint.
    #[arg(long, default_value = "/v1/auth/csrf", env = "ADMINPLUS_CSRF_PATH")]
    pub csrf_path: String,

    /// Route of the login entry.
    #[arg(long, default_value = "/login", env = "ADMINPLUS_LOGIN_ROUTE")]
    pub login_route: String,

    /// Route an authenticated user is sent to instead of the login entry.
    #[arg(long, default_value = "/", env = "ADMINPLUS_HOME_ROUTE")]
    pub home_route: String,

    /// Directory holding persisted session state.
    #[arg(long, env = "ADMINPLUS_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults for everything except the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            encryption_key: None,
            request_timeout_ms: 30_000,
            refresh_timeout_ms: 30_000,
            prompt_timeout_ms: 300_000,
            renewal: RenewalMode::Refresh,
            refresh_path: "/auth/refresh".to_owned(),
            login_path: "/v1/auth/login".to_owned(),
            menu_path: "/v1/sys/menus/user/tree".to_owned(),
            csrf_path: "/v1/auth/csrf".to_owned(),
            login_route: "/login".to_owned(),
            home_route: "/".to_owned(),
            state_dir: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }

    /// Upper bound on one renewal cycle. Modes that may prompt get the
    /// prompt allowance on top of the refresh bound.
    pub fn renewal_timeout(&self) -> Duration {
        if self.renewal.needs_prompt() {
            self.refresh_timeout() + self.prompt_timeout()
        } else {
            self.refresh_timeout()
        }
    }

    /// Fail-fast checks run before anything touches the network or storage.
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base url must be http or https, got {:?}",
                url.scheme()
            )));
        }
        match self.encryption_key {
            Some(ref key) if key.len() >= MIN_KEY_LEN => {}
            _ => {
                return Err(ClientError::Config(format!(
                    "encryption key missing or shorter than {MIN_KEY_LEN} bytes"
                )))
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::Config("request timeout must be positive".to_owned()));
        }
        if self.refresh_timeout_ms == 0 {
            return Err(ClientError::Config("refresh timeout must be positive".to_owned()));
        }
        if self.prompt_timeout_ms == 0 {
            return Err(ClientError::Config("prompt timeout must be positive".to_owned()));
        }
        for (name, route) in [("login route", &self.login_route), ("home route", &self.home_route)] {
            if !route.starts_with('/') {
                return Err(ClientError::Config(format!("{name} must start with '/': {route:?}")));
            }
        }
        if self.login_route == self.home_route {
            return Err(ClientError::Config("login route and home route must differ".to_owned()));
        }
        Ok(())
    }

    /// Resolve the state directory from the flag and the environment.
    pub fn resolve_state_dir(&self) -> PathBuf {
        resolve_state_dir(
            self.state_dir.as_deref(),
            std::env::var_os("XDG_STATE_HOME").map(PathBuf::from).as_deref(),
            std::env::var_os("HOME").map(PathBuf::from).as_deref(),
        )
    }

    /// Session document inside the state directory.
    pub fn session_file(&self) -> PathBuf {
        self.resolve_state_dir().join("session.json")
    }
}

/// Explicit dir, then `$XDG_STATE_HOME/adminplus`, then
/// `$HOME/.local/state/adminplus`, then `.adminplus`.
pub fn resolve_state_dir(explicit: Option<&Path>, xdg: Option<&Path>, home: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(xdg) = xdg.filter(|p| !p.as_os_str().is_empty()) {
        return xdg.join("adminplus");
    }
    if let Some(home) = home.filter(|p| !p.as_os_str().is_empty()) {
        return home.join(".local").join("state").join("adminplus");
    }
    PathBuf::from(".adminplus")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
