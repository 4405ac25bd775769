// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session scenarios: sign-in and first navigation, a shared
//! refresh for simultaneous rejections, and a refresh that is itself
//! rejected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use adminplus_client::{
    ClientError, LoginForm, Navigation, Route, RouteGuard, RouteTable, SessionClient,
    SessionEvent, Storage,
};
use adminplus_specs::{client, wait_for, MockBackend, PASSWORD, USERNAME};

const TIMEOUT: Duration = Duration::from_secs(5);

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Park three requests behind one held refresh, then let it finish.
async fn three_rejections(
    api: &MockBackend,
    client: &SessionClient,
) -> anyhow::Result<Vec<Result<serde_json::Value, ClientError>>> {
    api.expire_access();
    api.hold_refresh();

    let mut tasks = Vec::new();
    for id in ["a", "b", "c"] {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.get(&format!("/v1/items/{id}")).await }));
    }
    wait_for(TIMEOUT, || client.coordinator().queued() == 3).await?;
    assert_eq!(api.refresh_calls(), 1);

    api.release_refresh();
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await?);
    }
    Ok(results)
}

#[tokio::test]
async fn login_then_first_navigation_installs_routes() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, _) = client(&api.serve().await?)?;
    let mut rx = client.subscribe();

    let resp = client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    assert_eq!(resp.token, "T1");
    assert_eq!(resp.refresh_token.as_deref(), Some("R1"));

    let store = client.store();
    assert_eq!(store.access_token().as_deref(), Some("T1"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    assert_eq!(store.user().map(|u| u.username).as_deref(), Some(USERNAME));
    assert_eq!(store.permissions().iter().collect::<Vec<_>>(), vec!["user:read"]);
    assert!(!store.routes_loaded());

    let table = Arc::new(RouteTable::new());
    let guard = RouteGuard::new(client.clone(), table.clone());
    let target = Route::protected("/system/user");

    assert_eq!(guard.before_each(&target).await, Navigation::Reenter("/system/user".to_owned()));
    assert!(store.routes_loaded());
    assert_eq!(api.menu_calls(), 1);
    assert!(table.resolve("/system/user").is_some());

    assert_eq!(guard.before_each(&target).await, Navigation::Proceed);
    assert_eq!(api.menu_calls(), 1);

    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::LoggedIn { username: USERNAME.to_owned() },
            SessionEvent::RoutesInstalled { count: 3 },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn simultaneous_rejections_replay_with_renewed_token() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, _) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    let mut rx = client.subscribe();

    let results = three_rejections(&api, &client).await?;
    for (result, id) in results.into_iter().zip(["a", "b", "c"]) {
        assert_eq!(result?["id"], id);
    }

    assert_eq!(api.refresh_presented(), vec!["R1"]);
    assert_eq!(client.store().access_token().as_deref(), Some("T2"));
    assert_eq!(client.store().refresh_token().as_deref(), Some("R2"));

    let items = api.requests_to("/v1/items/");
    let rejected: Vec<_> = items.iter().filter(|r| !r.accepted).collect();
    let replayed: Vec<_> = items.iter().filter(|r| r.accepted).collect();
    assert_eq!(rejected.len(), 3);
    assert!(rejected.iter().all(|r| r.bearer.as_deref() == Some("T1")));
    assert_eq!(replayed.len(), 3);
    assert!(replayed.iter().all(|r| r.bearer.as_deref() == Some("T2")));

    assert_eq!(drain(&mut rx), vec![SessionEvent::Refreshed { replayed: 3 }]);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_clears_session_and_redirects() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, storage) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    let mut rx = client.subscribe();
    api.fail_refresh(true);

    let results = three_rejections(&api, &client).await?;
    for result in results {
        assert!(matches!(result, Err(ClientError::Auth(_))), "got {result:?}");
    }

    assert!(!client.store().is_authenticated());
    assert!(storage.keys().is_empty());
    assert_eq!(api.requests_to("/v1/items/").iter().filter(|r| r.accepted).count(), 0);
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::Cleared, SessionEvent::LoginRequired { redirect: "/login".to_owned() }]
    );

    let guard = RouteGuard::new(client.clone(), Arc::new(RouteTable::new()));
    assert_eq!(
        guard.before_each(&Route::protected("/dashboard")).await,
        Navigation::Redirect("/login".to_owned())
    );
    Ok(())
}

#[tokio::test]
async fn enveloped_refresh_response_is_accepted() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, _) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;
    api.envelope_refresh(true);
    api.expire_access();

    assert_eq!(client.get("/v1/items/9").await?["id"], "9");
    assert_eq!(client.store().access_token().as_deref(), Some("T2"));
    Ok(())
}

#[tokio::test]
async fn anti_forgery_token_follows_mutations() -> anyhow::Result<()> {
    let api = MockBackend::new();
    let (client, _) = client(&api.serve().await?)?;
    client.login(LoginForm::new(USERNAME, PASSWORD)).await?;

    assert_eq!(client.bootstrap_csrf().await?.as_deref(), Some("csrf-1"));
    let created = client
        .send(adminplus_client::RequestDescriptor::post(
            "/v1/items",
            serde_json::json!({ "name": "widget" }),
        ))
        .await?;
    assert_eq!(created["created"]["name"], "widget");

    let posts = api.requests_to("/v1/items");
    let post = posts.iter().find(|r| r.method == "POST").ok_or_else(|| anyhow::anyhow!("no POST"))?;
    assert_eq!(post.csrf.as_deref(), Some("csrf-1"));
    assert_eq!(client.store().csrf_token().as_deref(), Some("csrf-2"));

    client.get("/v1/items/1").await?;
    let get = api.requests_to("/v1/items/1");
    assert_eq!(get.last().and_then(|r| r.csrf.clone()), None);
    Ok(())
}
