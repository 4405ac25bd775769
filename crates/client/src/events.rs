// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events.
//!
//! Navigation and user-visible side effects are not performed by the client
//! itself: it publishes events and the embedding UI (or CLI) reacts.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the session client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login committed a fresh session.
    LoggedIn { username: String },
    /// The credential was renewed and queued requests were replayed.
    Refreshed { replayed: usize },
    /// All session state was wiped.
    Cleared,
    /// The embedding UI must navigate to the login entry point.
    LoginRequired { redirect: String },
    /// The authorization-scoped navigation structure was installed.
    RoutesInstalled { count: usize },
}

/// Broadcast channel capacity for session events.
pub const EVENT_CAPACITY: usize = 64;

/// Create the event channel shared by the store, coordinator, and guard.
pub fn channel() -> broadcast::Sender<SessionEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
