// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use serde_json::Value;

use adminplus_client::transport::Method;
use adminplus_client::ClientConfig;

/// Command-line console for the AdminPlus admin API.
#[derive(Debug, Parser)]
#[command(name = "adminplus", version, about)]
pub struct Config {
    #[command(flatten)]
    pub client: ClientConfig,

    /// Log format (json or text).
    #[arg(long, env = "ADMINPLUS_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ADMINPLUS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and persist the session.
    Login(LoginArgs),
    /// Show the signed-in user's profile and permissions.
    Whoami,
    /// Send an authenticated request and print the payload.
    Request(RequestArgs),
    /// Load the menu tree through the route guard and print the installed routes.
    Menus,
    /// Sign out on the server and clear the local session.
    Logout,
}

#[derive(Debug, Clone, clap::Args)]
pub struct LoginArgs {
    #[arg(long, env = "ADMINPLUS_USERNAME")]
    pub username: String,

    /// Read from stdin when omitted.
    #[arg(long, env = "ADMINPLUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, requires = "captcha_code")]
    pub captcha_id: Option<String>,

    #[arg(long, requires = "captcha_id")]
    pub captcha_code: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE).
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Path relative to the base URL, e.g. `/v1/sys/users`.
    pub path: String,

    /// JSON request body.
    #[arg(long, value_parser = parse_json)]
    pub data: Option<Value>,

    /// Query parameter as `key=value`; repeatable.
    #[arg(long = "query", value_parser = parse_pair)]
    pub query: Vec<(String, String)>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;

        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }

        if let Command::Request(ref args) = self.command {
            if !args.path.starts_with('/') {
                anyhow::bail!("request path must start with '/': {}", args.path);
            }
        }

        Ok(())
    }
}

fn parse_method(s: &str) -> Result<Method, String> {
    match s.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => Err(format!("unsupported method: {other}")),
    }
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
