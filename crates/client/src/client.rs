// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authenticated request entry point.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::crypto::Cipher;
use crate::error::ClientError;
use crate::events::{self, SessionEvent};
use crate::refresh::strategy::{self, LoginPrompt, Renewal, RenewStrategy};
use crate::refresh::{BoxFuture, RecoveryTarget, RefreshCoordinator};
use crate::session::store::SessionStore;
use crate::session::SessionLoad;
use crate::storage::{MemoryStorage, Storage};
use crate::transport::http::Transport;
use crate::transport::RequestDescriptor;

/// Cheaply cloneable handle; clones share one session and one coordinator.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) transport: Transport,
    coordinator: RefreshCoordinator,
    strategy: Box<dyn RenewStrategy>,
    load: SessionLoad,
}

pub struct SessionClientBuilder {
    config: ClientConfig,
    storage: Option<Arc<dyn Storage>>,
    prompt: Option<Arc<dyn LoginPrompt>>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl SessionClientBuilder {
    /// Persist session state here instead of in process memory.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Prompt used by the interactive renewal modes.
    pub fn prompt(mut self, prompt: Arc<dyn LoginPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Publish session events on an existing channel.
    pub fn events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration, derive the key, and restore any persisted session.
    pub fn build(self) -> Result<SessionClient, ClientError> {
        self.config.validate()?;
        let cipher = Arc::new(Cipher::new(self.config.encryption_key.as_deref())?);
        self.build_with_cipher(cipher)
    }

    pub(crate) fn build_with_cipher(self, cipher: Arc<Cipher>) -> Result<SessionClient, ClientError> {
        let Self { config, storage, prompt, events } = self;
        let storage = storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let events = events.unwrap_or_else(events::channel);

        let store = Arc::new(SessionStore::new(storage, cipher, events));
        let load = store.initialize()?;
        let strategy = strategy::from_config(&config, prompt)?;
        let transport = Transport::new(&config.base_url, config.request_timeout(), Arc::clone(&store))?;
        let coordinator = RefreshCoordinator::new(config.renewal_timeout());

        debug!(base_url = %config.base_url, renewal = %config.renewal, ?load, "session client ready");
        Ok(SessionClient {
            inner: Arc::new(Inner { config, store, transport, coordinator, strategy, load }),
        })
    }
}

impl SessionClient {
    pub fn builder(config: ClientConfig) -> SessionClientBuilder {
        SessionClientBuilder { config, storage: None, prompt: None, events: None }
    }

    /// Send `descriptor` with the current credential.
    ///
    /// A 401 is handed to the refresh coordinator; the returned future then
    /// settles with the outcome of the replay.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Value, ClientError> {
        let credential = self.inner.store.credential();
        match self.inner.transport.dispatch(&descriptor, credential.as_ref()).await {
            Err(e) if e.http_status() == Some(401) => {
                let sent_with = credential.map(|c| c.access_token);
                self.inner.coordinator.recover(&*self.inner, descriptor, sent_with.as_deref()).await
            }
            other => other,
        }
    }

    /// [`send`](Self::send) and decode the payload.
    pub async fn send_as<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T, ClientError> {
        let value = self.send(descriptor).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Outcome of the decrypt-on-load run at construction.
    pub fn load(&self) -> SessionLoad {
        self.inner.load
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.store.events().subscribe()
    }

    /// Ask subscribers to navigate to the login entry.
    pub fn redirect_to_login(&self) {
        self.inner.redirect_to_login();
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.inner.config.base_url)
            .field("strategy", &self.inner.strategy.name())
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

impl Inner {
    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.store.events().send(event);
    }

    pub(crate) fn redirect_to_login(&self) {
        self.emit(SessionEvent::LoginRequired { redirect: self.config.login_route.clone() });
    }

    /// Apply a renewal to the store.
    ///
    /// A renewal that signs in a different user starts a new session.
    fn commit(&self, renewal: Renewal) -> Result<(), ClientError> {
        let Renewal { credential, user, permissions } = renewal;
        match user {
            Some(user) => {
                let same_user =
                    self.store.user().is_some_and(|current| current.username == user.username);
                if same_user {
                    self.store.set_credential(credential)?;
                    self.store.set_user(user)?;
                    if let Some(p) = permissions {
                        self.store.set_permissions(p)?;
                    }
                } else {
                    info!(username = %user.username, "renewal switched user, starting new session");
                    self.store.begin_session(credential, Some(user), permissions.unwrap_or_default())?;
                }
            }
            None => {
                self.store.set_credential(credential)?;
                if let Some(p) = permissions {
                    self.store.set_permissions(p)?;
                }
            }
        }
        Ok(())
    }
}

impl RecoveryTarget for Inner {
    fn current_token(&self) -> Option<String> {
        self.store.access_token()
    }

    fn renew(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            let renewal = self.strategy.renew(&self.transport, &self.store).await?;
            self.commit(renewal)
        })
    }

    fn replay(&self, descriptor: RequestDescriptor) -> BoxFuture<'_, Result<Value, ClientError>> {
        let credential = self.store.credential();
        Box::pin(async move { self.transport.dispatch(&descriptor, credential.as_ref()).await })
    }

    fn abandon(&self, reason: &ClientError) {
        warn!(err = %reason, "session abandoned");
        if let Err(e) = self.store.clear() {
            warn!(err = %e, "failed to clear session");
        }
        self.redirect_to_login();
    }

    fn renewed(&self, replayed: usize) {
        self.emit(SessionEvent::Refreshed { replayed });
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
