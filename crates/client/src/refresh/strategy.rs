// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renewal strategies run by the refresh coordinator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, RenewalMode};
use crate::error::ClientError;
use crate::refresh::BoxFuture;
use crate::session::store::SessionStore;
use crate::session::{Credential, Permissions, UserProfile};
use crate::transport::http::Transport;
use crate::transport::{RequestDescriptor, SUCCESS_CODE};

/// A freshly obtained credential plus whatever profile data came with it.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub credential: Credential,
    pub user: Option<UserProfile>,
    pub permissions: Option<Permissions>,
}

impl Renewal {
    pub fn credential_only(credential: Credential) -> Self {
        Self { credential, user: None, permissions: None }
    }
}

/// Credentials submitted to the login endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_code: Option<String>,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            captcha_id: None,
            captcha_code: None,
        }
    }

    pub fn with_captcha(mut self, id: impl Into<String>, code: impl Into<String>) -> Self {
        self.captcha_id = Some(id.into());
        self.captcha_code = Some(code.into());
        self
    }
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm").field("username", &self.username).finish_non_exhaustive()
    }
}

/// Body of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl LoginResponse {
    pub fn into_renewal(self) -> Renewal {
        Renewal {
            credential: Credential::new(self.token, self.refresh_token),
            user: self.user,
            permissions: Some(Permissions::new(self.permissions)),
        }
    }
}

/// Collects credentials from the user.
pub trait LoginPrompt: Send + Sync {
    /// `None` means the prompt was dismissed.
    fn prompt<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Option<LoginForm>>;
}

/// How a rejected credential is replaced.
pub trait RenewStrategy: Send + Sync {
    fn renew<'a>(
        &'a self,
        transport: &'a Transport,
        store: &'a SessionStore,
    ) -> BoxFuture<'a, Result<Renewal, ClientError>>;

    fn name(&self) -> &'static str;
}

/// Exchange the stored refresh token at the unauthenticated refresh endpoint.
#[derive(Debug, Clone)]
pub struct SilentRefresh {
    path: String,
}

impl SilentRefresh {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl RenewStrategy for SilentRefresh {
    fn renew<'a>(
        &'a self,
        transport: &'a Transport,
        store: &'a SessionStore,
    ) -> BoxFuture<'a, Result<Renewal, ClientError>> {
        Box::pin(async move {
            let refresh_token = store
                .refresh_token()
                .ok_or_else(|| ClientError::Auth("no refresh token available".to_owned()))?;
            debug!(path = %self.path, "exchanging refresh token");
            let body = transport.exchange(&self.path, &json!({ "refreshToken": refresh_token })).await?;
            parse_refresh(body).map(Renewal::credential_only)
        })
    }

    fn name(&self) -> &'static str {
        "refresh"
    }
}

/// Accepts `{ token, refreshToken? }`, or an envelope whose `data` is that
/// object or a bare token string.
pub fn parse_refresh(body: Value) -> Result<Credential, ClientError> {
    let data = match body.get("code").and_then(Value::as_i64) {
        Some(SUCCESS_CODE) => body.get("data").cloned().unwrap_or(Value::Null),
        Some(code) => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("refresh rejected")
                .to_owned();
            return Err(ClientError::Domain { code, message });
        }
        None => body,
    };

    match data {
        Value::String(token) if !token.is_empty() => Ok(Credential::new(token, None)),
        Value::Object(_) => {
            let cred: Credential =
                serde_json::from_value(data).map_err(|e| ClientError::Decode(e.to_string()))?;
            if cred.access_token.is_empty() {
                return Err(ClientError::Decode("refresh response carried an empty token".to_owned()));
            }
            Ok(cred)
        }
        other => Err(ClientError::Decode(format!("unexpected refresh response: {other}"))),
    }
}

/// Ask the user to sign in again and log in with what they enter.
pub struct InteractiveReauth {
    prompt: Arc<dyn LoginPrompt>,
    login_path: String,
}

impl InteractiveReauth {
    pub fn new(prompt: Arc<dyn LoginPrompt>, login_path: impl Into<String>) -> Self {
        Self { prompt, login_path: login_path.into() }
    }
}

impl RenewStrategy for InteractiveReauth {
    fn renew<'a>(
        &'a self,
        transport: &'a Transport,
        _store: &'a SessionStore,
    ) -> BoxFuture<'a, Result<Renewal, ClientError>> {
        Box::pin(async move {
            let form = self
                .prompt
                .prompt("session expired, please sign in again")
                .await
                .ok_or_else(|| ClientError::Auth("login prompt dismissed".to_owned()))?;
            info!(username = %form.username, "re-authenticating");
            login(transport, &self.login_path, &form).await.map(LoginResponse::into_renewal)
        })
    }

    fn name(&self) -> &'static str {
        "interactive"
    }
}

/// Silent refresh first, then the prompt.
pub struct RefreshThenInteractive {
    refresh: SilentRefresh,
    interactive: InteractiveReauth,
}

impl RenewStrategy for RefreshThenInteractive {
    fn renew<'a>(
        &'a self,
        transport: &'a Transport,
        store: &'a SessionStore,
    ) -> BoxFuture<'a, Result<Renewal, ClientError>> {
        Box::pin(async move {
            match self.refresh.renew(transport, store).await {
                Ok(renewal) => Ok(renewal),
                Err(e) => {
                    warn!(err = %e, "silent refresh failed, prompting");
                    self.interactive.renew(transport, store).await
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "refresh-then-interactive"
    }
}

/// Build the strategy selected by `config.renewal`.
pub fn from_config(
    config: &ClientConfig,
    prompt: Option<Arc<dyn LoginPrompt>>,
) -> Result<Box<dyn RenewStrategy>, ClientError> {
    let refresh = SilentRefresh::new(&config.refresh_path);
    let interactive = || match prompt.clone() {
        Some(p) => Ok(InteractiveReauth::new(p, &config.login_path)),
        None => Err(ClientError::Config(format!(
            "renewal mode {} needs a login prompt",
            config.renewal
        ))),
    };
    Ok(match config.renewal {
        RenewalMode::Refresh => Box::new(refresh),
        RenewalMode::Interactive => Box::new(interactive()?),
        RenewalMode::RefreshThenInteractive => {
            Box::new(RefreshThenInteractive { refresh, interactive: interactive()? })
        }
    })
}

/// POST the login form without a bearer and decode the response.
pub async fn login(
    transport: &Transport,
    path: &str,
    form: &LoginForm,
) -> Result<LoginResponse, ClientError> {
    let body = serde_json::to_value(form).map_err(|e| ClientError::Decode(e.to_string()))?;
    let data = transport.dispatch(&RequestDescriptor::post(path, body), None).await?;
    serde_json::from_value(data).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
