// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-shot HTTP dispatch: headers in, envelope out.
//!
//! [`Transport`] never retries. A 401 comes back as
//! `ClientError::Http { status: 401, .. }` and the session client hands it to
//! the refresh coordinator.

use std::sync::{Arc, Once};
use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::session::store::SessionStore;
use crate::session::Credential;
use crate::transport::{Envelope, RequestDescriptor, CSRF_HEADER};

/// Install the process-wide rustls crypto provider (idempotent).
///
/// reqwest is built with `rustls-no-provider`, so this must run before the
/// first client is constructed.
pub fn ensure_crypto() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl Transport {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<SessionStore>,
    ) -> Result<Self, ClientError> {
        ensure_crypto();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), store })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn build(
        &self,
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.http.request(descriptor.method.clone(), self.url(&descriptor.path));
        if let Some(cred) = credential {
            req = req.header(AUTHORIZATION, cred.bearer());
        }
        if descriptor.is_mutating() {
            if let Some(csrf) = self.store.csrf_token() {
                req = req.header(CSRF_HEADER, csrf);
            }
        }
        if !descriptor.query.is_empty() {
            req = req.query(&descriptor.query);
        }
        if let Some(ref body) = descriptor.body {
            req = req.json(body);
        }
        req
    }

    /// Send once with `credential` and unwrap the envelope.
    pub async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
    ) -> Result<Value, ClientError> {
        let resp = self
            .build(descriptor, credential)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = resp.status();
        let rotated = rotated_csrf(resp.headers());
        debug!(method = %descriptor.method, path = %descriptor.path, status = status.as_u16(), "response");

        if !status.is_success() {
            let detail = resp.text().await.ok().and_then(|body| server_message(&body));
            return Err(ClientError::from_status(status.as_u16(), detail));
        }

        let envelope: Envelope = resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        let data = envelope.into_result()?;

        if let Some(token) = rotated {
            self.cache_csrf(token);
        }
        Ok(data)
    }

    /// Send without a bearer and return the raw JSON body (no envelope unwrap).
    ///
    /// Used for the refresh exchange, whose response shape varies by backend.
    pub async fn exchange(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.ok().and_then(|body| server_message(&body));
            return Err(ClientError::from_status(status.as_u16(), detail));
        }
        resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Fetch a fresh anti-forgery token and cache it.
    ///
    /// The token is taken from the response header, falling back to
    /// `data.token` in the envelope.
    pub async fn bootstrap_csrf(&self, path: &str) -> Result<Option<String>, ClientError> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), None));
        }
        let header = rotated_csrf(resp.headers());
        let body = resp.text().await.map_err(|e| ClientError::Decode(e.to_string()))?;
        let from_body = serde_json::from_str::<Envelope>(&body)
            .ok()
            .and_then(|env| env.into_result().ok())
            .and_then(|data| data.get("token").and_then(Value::as_str).map(str::to_owned));

        let token = header.or(from_body);
        if let Some(ref t) = token {
            self.cache_csrf(t.clone());
        }
        Ok(token)
    }

    fn cache_csrf(&self, token: String) {
        if let Err(e) = self.store.set_csrf_token(Some(token)) {
            warn!(err = %e, "failed to cache anti-forgery token");
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

fn rotated_csrf(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Pull `message` out of an error body, if it is an envelope.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("message").and_then(Value::as_str).filter(|m| !m.is_empty()).map(str::to_owned)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
