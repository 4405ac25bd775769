// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fixtures, mock servers, and assertion helpers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::client::SessionClient;
use crate::config::ClientConfig;
use crate::crypto::Cipher;
use crate::events;
use crate::session::store::SessionStore;
use crate::storage::MemoryStorage;

pub const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Key derivation is slow; every test shares one cipher.
pub fn test_cipher() -> Arc<Cipher> {
    static CIPHER: OnceLock<Arc<Cipher>> = OnceLock::new();
    Arc::clone(CIPHER.get_or_init(|| match Cipher::new(Some(TEST_SECRET)) {
        Ok(c) => Arc::new(c),
        Err(e) => panic!("test cipher: {e}"),
    }))
}

/// Store over fresh in-memory storage. The storage handle is returned so
/// tests can inspect what was persisted.
pub fn memory_store() -> (Arc<SessionStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = Arc::new(SessionStore::new(
        Arc::clone(&storage) as Arc<dyn crate::storage::Storage>,
        test_cipher(),
        events::channel(),
    ));
    (store, storage)
}

pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(base_url);
    config.encryption_key = Some(TEST_SECRET.to_owned());
    config.request_timeout_ms = 5_000;
    config.refresh_timeout_ms = 5_000;
    config
}

/// `{ code: 200, data }` envelope body.
pub fn ok_envelope(data: Value) -> Value {
    json!({ "code": 200, "message": "success", "data": data, "timestamp": 1770000000000i64 })
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}

/// Client wired to `base_url` over in-memory storage, sharing the test cipher.
pub fn test_client(base_url: &str) -> anyhow::Result<SessionClient> {
    Ok(SessionClient::builder(test_config(base_url)).build_with_cipher(test_cipher())?)
}

/// Stateful stand-in for the admin API.
///
/// Exactly one access token is accepted at a time. `revoke()` expires it;
/// the refresh endpoint then mints `T<n+1>`/`R<n+1>` from the current
/// refresh token.
pub struct MockApi {
    generation: AtomicUsize,
    accepted: Mutex<Option<String>>,
    refresh: Mutex<Option<String>>,
    pub refresh_calls: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub logout_calls: AtomicUsize,
    pub logout_fails: AtomicBool,
    pub menu_calls: AtomicUsize,
    pub menu_fails: AtomicBool,
    pub bearers: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            generation: AtomicUsize::new(0),
            accepted: Mutex::new(None),
            refresh: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
            logout_calls: AtomicUsize::new(0),
            logout_fails: AtomicBool::new(false),
            menu_calls: AtomicUsize::new(0),
            menu_fails: AtomicBool::new(false),
            bearers: Mutex::new(Vec::new()),
        })
    }

    /// Expire the current access token server-side.
    pub fn revoke(&self) {
        *self.accepted.lock() = None;
    }

    pub fn accepted(&self) -> Option<String> {
        self.accepted.lock().clone()
    }

    fn mint(&self) -> (String, String) {
        let n = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pair = (format!("T{n}"), format!("R{n}"));
        *self.accepted.lock() = Some(pair.0.clone());
        *self.refresh.lock() = Some(pair.1.clone());
        pair
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned);
        match bearer {
            Some(b) => {
                self.bearers.lock().push(b.clone());
                self.accepted.lock().as_deref() == Some(b.as_str())
            }
            None => false,
        }
    }

    pub async fn serve(self: &Arc<Self>) -> anyhow::Result<String> {
        serve(self.router()).await
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/v1/auth/login", post(mock_login))
            .route("/auth/refresh", post(mock_refresh))
            .route("/v1/auth/me", get(mock_me))
            .route("/v1/auth/permissions", get(mock_permissions))
            .route("/v1/auth/logout", post(mock_logout))
            .route("/v1/sys/menus/user/tree", get(mock_menus))
            .route("/v1/items/{id}", get(mock_item))
            .with_state(Arc::clone(self))
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "code": 401, "message": "token expired" }))).into_response()
}

async fn mock_login(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    if body["username"] != "admin" || body["password"] != "secret123" {
        return Json(json!({ "code": 401, "message": "invalid username or password" })).into_response();
    }
    let (token, refresh) = api.mint();
    Json(ok_envelope(json!({
        "token": token,
        "refreshToken": refresh,
        "tokenType": "Bearer",
        "user": { "id": 1, "username": "admin", "nickname": "Administrator" },
        "permissions": ["user:read"],
    })))
    .into_response()
}

async fn mock_refresh(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let current = api.refresh.lock().clone();
    if api.refresh_fails.load(Ordering::SeqCst) || current.as_deref() != body["refreshToken"].as_str() {
        return unauthorized();
    }
    let (token, refresh) = api.mint();
    Json(json!({ "token": token, "refreshToken": refresh })).into_response()
}

async fn mock_me(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(ok_envelope(json!({
        "id": 1, "username": "admin", "nickname": "Administrator", "email": "admin@adminplus.test"
    })))
    .into_response()
}

async fn mock_permissions(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(ok_envelope(json!(["user:read", "role:read"]))).into_response()
}

async fn mock_logout(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    api.logout_calls.fetch_add(1, Ordering::SeqCst);
    if api.logout_fails.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if !api.authorized(&headers) {
        return unauthorized();
    }
    api.revoke();
    Json(ok_envelope(Value::Null)).into_response()
}

async fn mock_menus(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    api.menu_calls.fetch_add(1, Ordering::SeqCst);
    if api.menu_fails.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(ok_envelope(menu_tree())).into_response()
}

async fn mock_item(
    State(api): State<Arc<MockApi>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    Json(ok_envelope(json!({ "id": id }))).into_response()
}

/// Dashboard page, a system directory with two pages, and a button.
pub fn menu_tree() -> Value {
    json!([
        { "id": 1, "type": 1, "name": "Dashboard", "path": "/dashboard",
          "component": "Dashboard", "sortOrder": 1, "visible": 1, "children": null },
        { "id": 2, "type": 0, "name": "System", "path": "/system", "sortOrder": 2, "visible": 1,
          "children": [
            { "id": 3, "parentId": 2, "type": 1, "name": "Users", "path": "user",
              "component": "system/User", "permKey": "user:read", "sortOrder": 1, "visible": 1,
              "children": [
                { "id": 5, "parentId": 3, "type": 2, "name": "Delete user", "permKey": "user:delete" }
              ] },
            { "id": 4, "parentId": 2, "type": 1, "name": "Roles", "path": "role",
              "component": "/views/system/Role.vue", "permKey": "role:read", "sortOrder": 2,
              "visible": 0, "children": [] }
          ] }
    ])
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        match $expr {
            Ok(_) => panic!(concat!("expected Err for: ", stringify!($expr))),
            Err(err) => {
                let msg = err.to_string();
                assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
            }
        }
    }};
}
