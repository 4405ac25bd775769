// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal login prompt used by the interactive renewal modes.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Mutex;

use adminplus_client::refresh::BoxFuture;
use adminplus_client::{LoginForm, LoginPrompt};
use nix::sys::termios::{self, LocalFlags, SetArg};
use tracing::warn;

/// Reads a username and password from stdin, prompting on stderr.
///
/// A known username skips the first question. End of input dismisses the
/// prompt. The password is read with terminal echo off when stdin is a tty.
#[derive(Debug, Default)]
pub struct TerminalPrompt {
    username: Option<String>,
}

impl TerminalPrompt {
    pub fn new(username: Option<String>) -> Self {
        Self { username }
    }
}

impl LoginPrompt for TerminalPrompt {
    fn prompt<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Option<LoginForm>> {
        let reason = reason.to_owned();
        let username = self.username.clone();
        Box::pin(async move {
            let read = tokio::task::spawn_blocking(move || {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut stderr = std::io::stderr();
                read_form(&mut input, &mut stderr, &reason, username, EchoGuard::hide)
            })
            .await;
            match read {
                Ok(Ok(form)) => form,
                Ok(Err(e)) => {
                    warn!(err = %e, "login prompt failed");
                    None
                }
                Err(e) => {
                    warn!(err = %e, "login prompt task failed");
                    None
                }
            }
        })
    }
}

/// Attributes to put back if the process exits while a password read is
/// still blocked. Populated while echo is off, cleared on drop.
static SAVED_TERMIOS: Mutex<Option<nix::libc::termios>> = Mutex::new(None);

/// Restore echo left off by a password read that was abandoned (for example
/// when the renewal timed out). Does nothing otherwise.
pub fn restore_terminal() {
    let saved = SAVED_TERMIOS.lock().ok().and_then(|mut guard| guard.take());
    if let Some(saved) = saved {
        let _ = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &termios::Termios::from(saved));
    }
}

/// Turns terminal echo off on stdin and restores it on drop.
struct EchoGuard {
    original: termios::Termios,
}

impl EchoGuard {
    /// `None` when stdin is not a terminal (piped input is read as-is).
    fn hide() -> Option<Self> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        let original = match termios::tcgetattr(&stdin) {
            Ok(t) => t,
            Err(e) => {
                warn!(err = %e, "cannot read terminal attributes");
                return None;
            }
        };
        let mut quiet = original.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &quiet) {
            warn!(err = %e, "cannot disable terminal echo");
            return None;
        }
        if let Ok(mut guard) = SAVED_TERMIOS.lock() {
            *guard = Some(original.clone().into());
        }
        Some(Self { original })
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = SAVED_TERMIOS.lock() {
            *guard = None;
        }
        let _ = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.original);
    }
}

/// Read a single trimmed line; `None` on end of input.
pub fn read_line(input: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
}

/// Collect a login form. Blank answers dismiss the prompt.
///
/// `hide_input` runs right before the password is read; whatever it returns
/// is held until the read completes.
pub fn read_form<G>(
    input: &mut impl BufRead,
    out: &mut impl Write,
    reason: &str,
    username: Option<String>,
    hide_input: impl FnOnce() -> G,
) -> std::io::Result<Option<LoginForm>> {
    writeln!(out, "sign-in required: {reason}")?;
    let username = match username {
        Some(u) => u,
        None => {
            write!(out, "username: ")?;
            out.flush()?;
            match read_line(input)? {
                Some(u) if !u.trim().is_empty() => u.trim().to_owned(),
                _ => return Ok(None),
            }
        }
    };
    write!(out, "password for {username}: ")?;
    out.flush()?;
    let password = {
        let _hidden = hide_input();
        read_line(input)?
    };
    // Echo was off, so the user's newline was not shown.
    writeln!(out)?;
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(None),
    };
    Ok(Some(LoginForm::new(username, password)))
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
