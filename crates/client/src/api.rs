// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth and navigation endpoints the session itself depends on.

use tracing::{info, warn};

use crate::client::SessionClient;
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::guard::MenuNode;
use crate::refresh::strategy::{self, LoginForm, LoginResponse};
use crate::session::{Permissions, UserProfile};
use crate::transport::{Method, RequestDescriptor};

pub const ME_PATH: &str = "/v1/auth/me";
pub const PERMISSIONS_PATH: &str = "/v1/auth/permissions";
pub const LOGOUT_PATH: &str = "/v1/auth/logout";

impl SessionClient {
    /// Sign in and replace whatever session was there.
    ///
    /// The routes latch is reset so the next protected navigation reloads menus.
    pub async fn login(&self, form: LoginForm) -> Result<LoginResponse, ClientError> {
        let inner = self.inner();
        let resp = strategy::login(&inner.transport, &inner.config.login_path, &form).await?;

        let renewal = resp.clone().into_renewal();
        let username =
            renewal.user.as_ref().map_or_else(|| form.username.clone(), |u| u.username.clone());
        inner.store.begin_session(
            renewal.credential,
            renewal.user,
            renewal.permissions.unwrap_or_default(),
        )?;

        info!(username = %username, "signed in");
        inner.emit(SessionEvent::LoggedIn { username });
        Ok(resp)
    }

    /// Fetch the signed-in user's profile and store it.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let user: UserProfile = self.send_as(RequestDescriptor::get(ME_PATH)).await?;
        self.store().set_user(user.clone())?;
        Ok(user)
    }

    /// Fetch the signed-in user's permission set and store it.
    pub async fn current_permissions(&self) -> Result<Permissions, ClientError> {
        let granted: Vec<String> = self.send_as(RequestDescriptor::get(PERMISSIONS_PATH)).await?;
        let permissions = Permissions::new(granted);
        self.store().set_permissions(permissions.clone())?;
        Ok(permissions)
    }

    /// Authorization-scoped navigation structure.
    pub async fn user_menu_tree(&self) -> Result<Vec<MenuNode>, ClientError> {
        let path = self.config().menu_path.clone();
        self.send_as(RequestDescriptor::get(path)).await
    }

    /// Fetch and cache a fresh anti-forgery token.
    pub async fn bootstrap_csrf(&self) -> Result<Option<String>, ClientError> {
        let inner = self.inner();
        inner.transport.bootstrap_csrf(&inner.config.csrf_path).await
    }

    /// Best-effort server logout, then a full local clear.
    ///
    /// The server call never triggers a renewal and its failure does not stop
    /// the local clear.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let inner = self.inner();
        if let Some(credential) = inner.store.credential() {
            let descriptor = RequestDescriptor::new(Method::POST, LOGOUT_PATH);
            if let Err(e) = inner.transport.dispatch(&descriptor, Some(&credential)).await {
                warn!(err = %e, "server logout failed, clearing locally");
            }
        }
        inner.store.clear()?;
        inner.redirect_to_login();
        info!("signed out");
        Ok(())
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.store().has_permission(permission)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
