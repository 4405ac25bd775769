// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands: `login`, `whoami`, `request`, `menus`, `logout`.

pub mod auth;
pub mod menus;
pub mod request;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use adminplus_client::{ClientConfig, FileStorage, SessionClient, SessionLoad};

use crate::config::{Command, Config};
use crate::prompt::TerminalPrompt;

/// Build a client whose session lives in the state directory.
///
/// Interactive renewal modes get a terminal prompt; `username` pre-fills it.
pub fn build_client(config: &ClientConfig, username: Option<String>) -> anyhow::Result<SessionClient> {
    let path = config.session_file();
    let storage = FileStorage::open(&path)?;
    debug!(path = %path.display(), "session file");

    let mut builder = SessionClient::builder(config.clone()).storage(Arc::new(storage));
    if config.renewal.needs_prompt() {
        builder = builder.prompt(Arc::new(TerminalPrompt::new(username)));
    }
    let client = builder.build()?;

    if client.load() == SessionLoad::Cleared {
        warn!("stored session could not be decrypted and was discarded");
    }
    Ok(client)
}

/// Run one subcommand. `None` means there is nothing to print.
pub async fn execute(client: &SessionClient, command: &Command) -> anyhow::Result<Option<Value>> {
    let output = match command {
        Command::Login(args) => Some(serde_json::to_value(auth::login(client, args).await?)?),
        Command::Whoami => Some(serde_json::to_value(auth::whoami(client).await?)?),
        Command::Request(args) => Some(request::request(client, args).await?),
        Command::Menus => Some(serde_json::to_value(menus::menus(client).await?)?),
        Command::Logout => {
            auth::logout(client).await?;
            None
        }
    };
    Ok(output)
}

/// Entry point for `main`: build the client, run the subcommand, print JSON.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let username = match config.command {
        Command::Login(ref args) => Some(args.username.clone()),
        _ => None,
    };
    let client = build_client(&config.client, username)?;

    if let Some(output) = execute(&client, &config.command).await? {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
