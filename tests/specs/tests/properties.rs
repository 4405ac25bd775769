// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioural properties of the session client, exercised against the mock
//! backend through the public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::join_all;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use adminplus_client::refresh::{BoxFuture, RecoveryTarget};
use adminplus_client::session::{keys, SessionSnapshot};
use adminplus_client::{
    Cipher, ClientError, LoginForm, Phase, RefreshCoordinator, RequestDescriptor, SessionClient,
    SessionLoad, Storage,
};
use adminplus_specs::{client, config, wait_for, MockBackend, PASSWORD, SECRET, USERNAME};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn signed_in() -> anyhow::Result<(Arc<MockBackend>, SessionClient)> {
    let api = MockBackend::new();
    let (client, _) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    Ok((api, client))
}

// -- Single flight ------------------------------------------------------------

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() -> anyhow::Result<()> {
    let (api, client) = signed_in().await?;
    api.expire_access();

    let calls = (0..8).map(|i| {
        let client = client.clone();
        async move { client.get(&format!("/v1/items/{i}")).await }
    });
    for (i, result) in join_all(calls).await.into_iter().enumerate() {
        assert_eq!(result?["id"], i.to_string());
    }

    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(api.refresh_presented(), vec!["R1"]);
    assert_eq!(client.coordinator().cycles(), 1);
    assert_eq!(client.store().access_token().as_deref(), Some("T2"));
    Ok(())
}

#[tokio::test]
async fn requests_arriving_mid_refresh_are_parked() -> anyhow::Result<()> {
    let (api, client) = signed_in().await?;
    api.expire_access();
    api.hold_refresh();

    let mut tasks = Vec::new();
    for i in 0..4 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.get(&format!("/v1/items/{i}")).await }));
    }
    wait_for(TIMEOUT, || client.coordinator().queued() == 4).await?;
    assert_eq!(client.coordinator().phase(), Phase::Refreshing);
    assert_eq!(api.refresh_calls(), 1);

    api.release_refresh();
    for task in tasks {
        task.await??;
    }
    assert_eq!(api.refresh_calls(), 1);
    assert_eq!(client.coordinator().phase(), Phase::Idle);
    Ok(())
}

// -- FIFO replay --------------------------------------------------------------

/// Target whose renewal waits for a permit and whose replays record their
/// initiation order.
struct OrderedTarget {
    token: Mutex<Option<String>>,
    gate: Semaphore,
    initiated: Mutex<Vec<String>>,
    renewals: AtomicUsize,
}

impl RecoveryTarget for OrderedTarget {
    fn current_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn renew(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await.map_err(|e| ClientError::Auth(e.to_string()))?;
            permit.forget();
            *self.token.lock() = Some("T2".to_owned());
            Ok(())
        })
    }

    fn replay(&self, descriptor: RequestDescriptor) -> BoxFuture<'_, Result<Value, ClientError>> {
        self.initiated.lock().push(descriptor.path.clone());
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(json!({ "path": descriptor.path }))
        })
    }

    fn abandon(&self, _reason: &ClientError) {}
}

#[tokio::test]
async fn replays_start_in_enqueue_order() -> anyhow::Result<()> {
    let target = Arc::new(OrderedTarget {
        token: Mutex::new(Some("T1".to_owned())),
        gate: Semaphore::new(0),
        initiated: Mutex::new(Vec::new()),
        renewals: AtomicUsize::new(0),
    });
    let coordinator = Arc::new(RefreshCoordinator::new(TIMEOUT));

    let mut tasks = Vec::new();
    for (n, path) in ["/a", "/b", "/c"].into_iter().enumerate() {
        let (task_target, task_coordinator) = (Arc::clone(&target), Arc::clone(&coordinator));
        tasks.push(tokio::spawn(async move {
            task_coordinator.recover(&*task_target, RequestDescriptor::get(path), Some("T1")).await
        }));
        wait_for(TIMEOUT, || coordinator.queued() == n + 1).await?;
    }

    target.gate.add_permits(1);
    let mut settled = Vec::new();
    for task in tasks {
        settled.push(task.await??["path"].clone());
    }

    assert_eq!(*target.initiated.lock(), vec!["/a", "/b", "/c"]);
    assert_eq!(settled, vec![json!("/a"), json!("/b"), json!("/c")]);
    assert_eq!(target.renewals.load(Ordering::SeqCst), 1);
    Ok(())
}

// -- No deadlock --------------------------------------------------------------

#[tokio::test]
async fn failed_refresh_resets_and_allows_a_new_cycle() -> anyhow::Result<()> {
    let (api, client) = signed_in().await?;
    api.expire_access();
    api.fail_refresh(true);

    let result = client.get("/v1/items/1").await;
    assert!(matches!(result, Err(ClientError::Auth(_))), "got {result:?}");
    assert_eq!(client.coordinator().phase(), Phase::Idle);
    assert_eq!(client.coordinator().queued(), 0);

    api.fail_refresh(false);
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    api.expire_access();

    assert_eq!(client.get("/v1/items/2").await?["id"], "2");
    assert_eq!(api.refresh_calls(), 2);
    assert_eq!(client.coordinator().cycles(), 2);
    Ok(())
}

#[tokio::test]
async fn refresh_timeout_counts_as_failure() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let mut config = config(&api.serve().await?);
    config.refresh_timeout_ms = 200;
    let client = SessionClient::builder(config).build()?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    api.expire_access();
    api.delay_refresh(Duration::from_secs(3));

    let result = client.get("/v1/items/1").await;
    assert!(matches!(result, Err(ClientError::Auth(_))), "got {result:?}");
    assert_eq!(client.coordinator().phase(), Phase::Idle);
    assert_eq!(client.coordinator().queued(), 0);
    assert!(!client.store().is_authenticated());
    Ok(())
}

// -- Encryption boundary ------------------------------------------------------

fn cipher() -> &'static Cipher {
    static CIPHER: OnceLock<Cipher> = OnceLock::new();
    CIPHER.get_or_init(|| match Cipher::new(Some(SECRET)) {
        Ok(c) => c,
        Err(e) => panic!("cipher: {e}"),
    })
}

fn flip(sealed: &str, index: usize) -> Result<String, TestCaseError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut raw = engine.decode(sealed).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let at = index % raw.len();
    raw[at] ^= 0x01;
    Ok(engine.encode(raw))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sealed_values_round_trip(
        name in "[a-zA-Z0-9_]{1,24}",
        perms in prop::collection::vec("[a-z]{1,8}:[a-z]{1,8}", 0..8),
        level in any::<i64>(),
    ) {
        let value = json!({ "username": name, "permissions": perms, "level": level });
        let sealed = cipher().encrypt(&value).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let opened: Value = cipher().decrypt(&sealed).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(opened, value);
    }

    #[test]
    fn flipped_byte_never_decrypts(token in "[A-Za-z0-9]{1,64}", index in any::<usize>()) {
        let sealed = cipher().encrypt(&token).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let tampered = flip(&sealed, index)?;
        prop_assert!(cipher().decrypt::<String>(&tampered).is_err());
    }
}

#[tokio::test]
async fn tampered_session_is_discarded_on_restart() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let base = api.serve().await?;
    let (first, storage) = client(&base)?;
    first.login(LoginForm::new(USERNAME, PASSWORD)).await?;

    let sealed = storage.get(keys::TOKEN).ok_or_else(|| anyhow::anyhow!("token not persisted"))?;
    let engine = base64::engine::general_purpose::STANDARD;
    let mut raw = engine.decode(&sealed)?;
    let last = raw.len() - 1;
    raw[last] ^= 0x80;
    storage.set(keys::TOKEN, engine.encode(raw))?;

    let second = SessionClient::builder(config(&base))
        .storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .build()?;
    assert_eq!(second.load(), SessionLoad::Cleared);
    assert!(!second.store().is_authenticated());
    assert!(storage.keys().is_empty());
    Ok(())
}

// -- Logout -------------------------------------------------------------------

#[tokio::test]
async fn logout_leaves_nothing_behind() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, storage) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    client.bootstrap_csrf().await?;
    client.store().set_routes_loaded(true)?;
    assert!(!storage.keys().is_empty());

    client.logout().await?;
    assert_eq!(api.logout_calls(), 1);
    for key in keys::ALL {
        assert_eq!(storage.get(key), None, "{key} survived logout");
    }
    assert_eq!(client.store().snapshot(), SessionSnapshot::default());
    assert!(!client.store().routes_loaded());
    assert_eq!(client.store().csrf_token(), None);

    assert!(!client.store().clear()?);
    assert!(storage.keys().is_empty());
    Ok(())
}
