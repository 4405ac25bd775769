// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! adminplus-client: authenticated session client for the AdminPlus console API.
//!
//! Requests go out through [`SessionClient::send`]. Concurrent 401s are
//! collapsed into one credential renewal by the [`RefreshCoordinator`], and
//! session state is persisted encrypted through the [`SessionStore`].

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod guard;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub mod test_support;

pub use client::{SessionClient, SessionClientBuilder};
pub use config::{ClientConfig, RenewalMode};
pub use crypto::Cipher;
pub use error::{ClientError, CryptoError};
pub use events::SessionEvent;
pub use guard::{MenuNode, Navigation, Route, RouteGuard, RouteTable};
pub use refresh::strategy::{LoginForm, LoginPrompt, LoginResponse};
pub use refresh::{Phase, RefreshCoordinator};
pub use session::store::SessionStore;
pub use session::{Credential, Permissions, SessionLoad, UserProfile};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use transport::http::ensure_crypto;
pub use transport::RequestDescriptor;
