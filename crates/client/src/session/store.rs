// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: the single writer of session state.
//!
//! Every mutation is sealed through the [`Cipher`] and written to [`Storage`]
//! as one batch before the in-memory copy changes. A batch that fails part
//! way is rolled back, so storage and memory agree on what a restart would
//! restore. Reads serve the in-memory copy; decryption happens once, in
//! [`SessionStore::initialize`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::crypto::Cipher;
use crate::error::{ClientError, CryptoError};
use crate::events::SessionEvent;
use crate::session::{keys, Credential, Permissions, SessionLoad, SessionSnapshot, UserProfile};
use crate::storage::{Change, Storage};

pub struct SessionStore {
    storage: Arc<dyn Storage>,
    cipher: Arc<Cipher>,
    state: RwLock<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        cipher: Arc<Cipher>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { storage, cipher, state: RwLock::new(SessionSnapshot::default()), events }
    }

    /// One-time decrypt-on-load.
    ///
    /// Any decryption failure is treated as "no session": persisted state is
    /// wiped and [`SessionLoad::Cleared`] is returned rather than an error.
    pub fn initialize(&self) -> Result<SessionLoad, ClientError> {
        if keys::ALL.iter().all(|k| self.storage.get(k).is_none()) {
            return Ok(SessionLoad::Empty);
        }

        match self.load_persisted() {
            Ok(snapshot) => {
                debug!(
                    authenticated = snapshot.is_authenticated(),
                    routes_loaded = snapshot.routes_loaded,
                    "session restored"
                );
                *self.state.write() = snapshot;
                Ok(SessionLoad::Restored)
            }
            Err(e) => {
                warn!(err = %e, "persisted session unreadable, clearing");
                self.clear()?;
                Ok(SessionLoad::Cleared)
            }
        }
    }

    fn load_persisted(&self) -> Result<SessionSnapshot, CryptoError> {
        let access: Option<String> = self.open(keys::TOKEN)?;
        let refresh: Option<String> = self.open(keys::REFRESH_TOKEN)?;
        let user: Option<UserProfile> = self.open(keys::USER)?;
        let permissions: Option<Permissions> = self.open(keys::PERMISSIONS)?;

        Ok(SessionSnapshot {
            credential: access.map(|token| Credential::new(token, refresh)),
            user,
            permissions: permissions.unwrap_or_default(),
            routes_loaded: self.storage.get(keys::ROUTES_LOADED).as_deref() == Some("true"),
            csrf_token: self.storage.get(keys::CSRF_TOKEN),
        })
    }

    fn open<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CryptoError> {
        match self.storage.get(key) {
            Some(sealed) => self.cipher.decrypt(&sealed).map(Some),
            None => Ok(None),
        }
    }

    fn seal<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<String, ClientError> {
        Ok(self.cipher.encrypt(value)?)
    }

    /// Write `changes` as a unit, restoring the touched keys if any write fails.
    fn persist(&self, changes: Vec<Change<'_>>) -> Result<(), ClientError> {
        let previous: Vec<Change<'_>> = changes.iter().map(|(key, _)| (*key, self.storage.get(key))).collect();
        let Err(e) = self.storage.apply(changes) else {
            return Ok(());
        };
        warn!(err = %e, "session write failed, rolling back");
        for (key, value) in previous {
            let restored = match value {
                Some(value) => self.storage.set(key, value),
                None => self.storage.remove(key),
            };
            if let Err(rollback) = restored {
                warn!(key, err = %rollback, "failed to restore session key");
            }
        }
        Err(e)
    }

    // -- Reads ---------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.state.read().credential.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().credential.as_ref().map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().credential.as_ref().and_then(|c| c.refresh_token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().user.clone()
    }

    pub fn permissions(&self) -> Permissions {
        self.state.read().permissions.clone()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.state.read().permissions.has(permission)
    }

    pub fn routes_loaded(&self) -> bool {
        self.state.read().routes_loaded
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.state.read().csrf_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().credential.is_some()
    }

    pub fn events(&self) -> &broadcast::Sender<SessionEvent> {
        &self.events
    }

    // -- Writes --------------------------------------------------------------

    /// Commit a new access token.
    ///
    /// When `credential.refresh_token` is `None` the current refresh token is kept.
    pub fn set_credential(&self, credential: Credential) -> Result<(), ClientError> {
        let mut state = self.state.write();
        let refresh_token = credential
            .refresh_token
            .or_else(|| state.credential.as_ref().and_then(|c| c.refresh_token.clone()));

        self.persist(vec![
            (keys::TOKEN, Some(self.seal(&credential.access_token)?)),
            (keys::REFRESH_TOKEN, refresh_token.as_ref().map(|rt| self.seal(rt)).transpose()?),
        ])?;

        state.credential = Some(Credential { access_token: credential.access_token, refresh_token });
        Ok(())
    }

    pub fn set_user(&self, user: UserProfile) -> Result<(), ClientError> {
        let mut state = self.state.write();
        self.persist(vec![(keys::USER, Some(self.seal(&user)?))])?;
        state.user = Some(user);
        Ok(())
    }

    pub fn set_permissions(&self, permissions: Permissions) -> Result<(), ClientError> {
        let mut state = self.state.write();
        self.persist(vec![(keys::PERMISSIONS, Some(self.seal(&permissions)?))])?;
        state.permissions = permissions;
        Ok(())
    }

    /// Set the routes latch. `false` removes the persisted flag.
    pub fn set_routes_loaded(&self, loaded: bool) -> Result<(), ClientError> {
        let mut state = self.state.write();
        self.persist(vec![(keys::ROUTES_LOADED, loaded.then(|| "true".to_owned()))])?;
        state.routes_loaded = loaded;
        Ok(())
    }

    /// Cache (or forget) the anti-forgery token. Stored in plaintext.
    pub fn set_csrf_token(&self, token: Option<String>) -> Result<(), ClientError> {
        let mut state = self.state.write();
        if state.csrf_token == token {
            return Ok(());
        }
        self.persist(vec![(keys::CSRF_TOKEN, token.clone())])?;
        state.csrf_token = token;
        Ok(())
    }

    /// Replace the whole session after a login.
    ///
    /// Leftovers of a previous session (refresh token, latch) do not survive;
    /// the cached anti-forgery token does.
    pub fn begin_session(
        &self,
        credential: Credential,
        user: Option<UserProfile>,
        permissions: Permissions,
    ) -> Result<(), ClientError> {
        let mut state = self.state.write();

        self.persist(vec![
            (keys::TOKEN, Some(self.seal(&credential.access_token)?)),
            (keys::REFRESH_TOKEN, credential.refresh_token.as_ref().map(|rt| self.seal(rt)).transpose()?),
            (keys::USER, user.as_ref().map(|u| self.seal(u)).transpose()?),
            (keys::PERMISSIONS, Some(self.seal(&permissions)?)),
            (keys::ROUTES_LOADED, None),
        ])?;

        let csrf_token = state.csrf_token.take();
        *state = SessionSnapshot {
            credential: Some(credential),
            user,
            permissions,
            routes_loaded: false,
            csrf_token,
        };
        Ok(())
    }

    /// Remove every persisted session key and reset memory to defaults.
    ///
    /// Idempotent: returns `false` and emits nothing when already empty.
    pub fn clear(&self) -> Result<bool, ClientError> {
        let mut state = self.state.write();

        let removed = keys::ALL.iter().any(|key| self.storage.get(key).is_some());
        if removed {
            self.persist(keys::ALL.iter().map(|key| (*key, None)).collect())?;
        }
        let dirty = *state != SessionSnapshot::default();
        *state = SessionSnapshot::default();
        drop(state);

        if removed || dirty {
            info!("session cleared");
            let _ = self.events.send(SessionEvent::Cleared);
        }
        Ok(removed || dirty)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("state", &*self.state.read()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
