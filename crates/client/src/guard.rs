// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-navigation session bootstrap.
//!
//! Each navigation is checked against the credential store. The first
//! protected navigation of a session loads the user's menu tree, installs it,
//! latches `routes_loaded`, and asks the caller to re-dispatch so the target
//! resolves against the installed routes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::SessionClient;
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::refresh::BoxFuture;

/// Menu type for buttons; they carry permissions but are not routes.
pub const MENU_TYPE_BUTTON: i32 = 2;
/// Menu type for leaf pages.
pub const MENU_TYPE_PAGE: i32 = 1;

/// One node of the authorization-scoped menu tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// 0 directory, 1 page, 2 button.
    #[serde(default, rename = "type")]
    pub kind: Option<i32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub perm_key: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
    #[serde(default)]
    pub visible: Option<i32>,
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<MenuNode>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<MenuNode>, D::Error> {
    Ok(Option::<Vec<MenuNode>>::deserialize(d)?.unwrap_or_default())
}

impl MenuNode {
    pub fn is_button(&self) -> bool {
        self.kind == Some(MENU_TYPE_BUTTON)
    }

    pub fn is_hidden(&self) -> bool {
        self.visible == Some(0)
    }
}

/// Views the console knows how to render, keyed by the menu `component` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Dashboard,
    Profile,
    SystemUser,
    SystemRole,
    SystemMenu,
    SystemDict,
    SystemDictItem,
    NotFound,
}

impl View {
    const TABLE: [(&'static str, View); 7] = [
        ("Dashboard", View::Dashboard),
        ("Profile", View::Profile),
        ("system/User", View::SystemUser),
        ("system/Role", View::SystemRole),
        ("system/Menu", View::SystemMenu),
        ("system/Dict", View::SystemDict),
        ("system/DictItem", View::SystemDictItem),
    ];

    /// Accepts `system/User`, `system/User.vue`, and `/views/system/User.vue`.
    /// Anything unknown maps to [`View::NotFound`].
    pub fn from_component(component: &str) -> Self {
        let key = component.trim_start_matches('/');
        let key = key.strip_prefix("views/").unwrap_or(key);
        let key = key.strip_suffix(".vue").unwrap_or(key);
        Self::TABLE.iter().find(|(k, _)| *k == key).map_or(Self::NotFound, |(_, v)| *v)
    }
}

/// A navigable page produced from the menu tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledRoute {
    pub path: String,
    pub name: String,
    pub view: View,
    pub permission: Option<String>,
    pub hidden: bool,
}

/// Receives the menu tree once per session.
pub trait RouteInstaller: Send + Sync {
    /// Install `menus`; returns the number of navigable routes.
    fn install(&self, menus: &[MenuNode]) -> usize;

    /// Whether a menu tree has been installed into this instance.
    fn is_installed(&self) -> bool;
}

/// In-memory route table built from the menu tree.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Vec<InstalledRoute>>,
    tree: RwLock<Vec<MenuNode>>,
    installed: AtomicBool,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<InstalledRoute> {
        self.routes.read().clone()
    }

    pub fn tree(&self) -> Vec<MenuNode> {
        self.tree.read().clone()
    }

    pub fn resolve(&self, path: &str) -> Option<InstalledRoute> {
        self.routes.read().iter().find(|r| r.path == path).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl RouteInstaller for RouteTable {
    fn install(&self, menus: &[MenuNode]) -> usize {
        let mut routes = Vec::new();
        flatten(menus, "", &mut routes);
        let count = routes.len();
        *self.routes.write() = routes;
        *self.tree.write() = menus.to_vec();
        self.installed.store(true, Ordering::Release);
        count
    }

    fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }
}

fn flatten(menus: &[MenuNode], parent: &str, out: &mut Vec<InstalledRoute>) {
    let mut ordered: Vec<&MenuNode> = menus.iter().filter(|m| !m.is_button()).collect();
    ordered.sort_by_key(|m| m.sort_order.unwrap_or(i32::MAX));

    for menu in ordered {
        let path = match menu.path.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => join_path(parent, p),
            None => parent.to_owned(),
        };
        if menu.kind == Some(MENU_TYPE_PAGE) {
            if let Some(component) = menu.component.as_deref().filter(|c| !c.is_empty()) {
                out.push(InstalledRoute {
                    path: path.clone(),
                    name: menu.name.clone(),
                    view: View::from_component(component),
                    permission: menu.perm_key.clone(),
                    hidden: menu.is_hidden(),
                });
            }
        }
        flatten(&menu.children, &path, out);
    }
}

fn join_path(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        return child.to_owned();
    }
    format!("{}/{child}", parent.trim_end_matches('/'))
}

/// A navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub requires_auth: bool,
}

impl Route {
    pub fn public(path: impl Into<String>) -> Self {
        Self { path: path.into(), requires_auth: false }
    }

    pub fn protected(path: impl Into<String>) -> Self {
        Self { path: path.into(), requires_auth: true }
    }
}

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(String),
    /// Routes were just installed; dispatch the same target again.
    Reenter(String),
}

/// Source of the menu tree.
pub trait MenuSource: Send + Sync {
    fn fetch_menu_tree(&self) -> BoxFuture<'_, Result<Vec<MenuNode>, ClientError>>;
}

impl MenuSource for SessionClient {
    fn fetch_menu_tree(&self) -> BoxFuture<'_, Result<Vec<MenuNode>, ClientError>> {
        Box::pin(self.user_menu_tree())
    }
}

pub struct RouteGuard {
    client: SessionClient,
    source: Arc<dyn MenuSource>,
    installer: Arc<dyn RouteInstaller>,
    loading: Mutex<()>,
}

impl RouteGuard {
    /// Guard that loads menus through `client` itself.
    pub fn new(client: SessionClient, installer: Arc<dyn RouteInstaller>) -> Self {
        let source = Arc::new(client.clone());
        Self::with_source(client, source, installer)
    }

    pub fn with_source(
        client: SessionClient,
        source: Arc<dyn MenuSource>,
        installer: Arc<dyn RouteInstaller>,
    ) -> Self {
        Self { client, source, installer, loading: Mutex::new(()) }
    }

    pub async fn before_each(&self, target: &Route) -> Navigation {
        let store = self.client.store();
        let config = self.client.config();
        let authenticated = store.is_authenticated();

        if !target.requires_auth {
            if target.path == config.login_route && authenticated {
                debug!(to = %config.home_route, "already signed in, leaving login");
                return Navigation::Redirect(config.home_route.clone());
            }
            return Navigation::Proceed;
        }
        if !authenticated {
            debug!(path = %target.path, "protected route without credential");
            return Navigation::Redirect(config.login_route.clone());
        }
        if self.routes_ready() {
            return Navigation::Proceed;
        }

        let _loading = self.loading.lock().await;
        if self.routes_ready() {
            // Installed by a concurrent navigation while we waited.
            return Navigation::Reenter(target.path.clone());
        }

        match self.load_routes().await {
            Ok(count) => {
                info!(count, path = %target.path, "routes installed");
                self.client.inner().emit(SessionEvent::RoutesInstalled { count });
                Navigation::Reenter(target.path.clone())
            }
            Err(e) => {
                warn!(err = %e, "route bootstrap failed, signing out");
                if let Err(clear_err) = store.clear() {
                    warn!(err = %clear_err, "failed to clear session");
                }
                // An auth failure was already redirected by the coordinator.
                if !matches!(e, ClientError::Auth(_)) {
                    self.client.redirect_to_login();
                }
                Navigation::Redirect(config.login_route.clone())
            }
        }
    }

    /// The latch outlives the process; the installed table does not.
    fn routes_ready(&self) -> bool {
        self.client.store().routes_loaded() && self.installer.is_installed()
    }

    async fn load_routes(&self) -> Result<usize, ClientError> {
        let menus = self.source.fetch_menu_tree().await?;
        let count = self.installer.install(&menus);
        self.client.store().set_routes_loaded(true)?;
        Ok(count)
    }
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard").field("client", &self.client).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
