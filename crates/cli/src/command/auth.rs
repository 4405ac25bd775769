// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use adminplus_client::session::token_preview;
use adminplus_client::{LoginForm, LoginPrompt, Permissions, SessionClient, UserProfile};

use crate::config::LoginArgs;
use crate::prompt::TerminalPrompt;

/// Printed after a successful `login`. Tokens are only shown as previews.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub username: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub permissions: Vec<String>,
}

/// Printed by `whoami`.
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub user: UserProfile,
    pub permissions: Permissions,
}

pub async fn login(client: &SessionClient, args: &LoginArgs) -> anyhow::Result<SignedIn> {
    let mut form = match args.password {
        Some(ref password) => LoginForm::new(args.username.clone(), password.clone()),
        None => TerminalPrompt::new(Some(args.username.clone()))
            .prompt("no password given")
            .await
            .ok_or_else(|| anyhow::anyhow!("login cancelled"))?,
    };
    if let (Some(id), Some(code)) = (&args.captcha_id, &args.captcha_code) {
        form = form.with_captcha(id.clone(), code.clone());
    }

    let resp = client.login(form).await?;
    let username = resp.user.as_ref().map_or_else(|| args.username.clone(), |u| u.username.clone());
    Ok(SignedIn {
        username,
        token: token_preview(&resp.token),
        token_type: resp.token_type,
        permissions: resp.permissions,
    })
}

pub async fn whoami(client: &SessionClient) -> anyhow::Result<WhoAmI> {
    if !client.store().is_authenticated() {
        anyhow::bail!("not signed in; run `adminplus login` first");
    }
    let user = client.current_user().await?;
    let permissions = client.current_permissions().await?;
    Ok(WhoAmI { user, permissions })
}

pub async fn logout(client: &SessionClient) -> anyhow::Result<()> {
    if !client.store().is_authenticated() {
        tracing::info!("no active session, clearing local state");
    }
    client.logout().await?;
    Ok(())
}
