// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use adminplus_client::guard::InstalledRoute;
use adminplus_client::{Navigation, Route, RouteGuard, RouteTable, SessionClient};

/// Navigate to the home route through the guard and return what it installed.
pub async fn menus(client: &SessionClient) -> anyhow::Result<Vec<InstalledRoute>> {
    let table = Arc::new(RouteTable::new());
    let guard = RouteGuard::new(client.clone(), table.clone());
    let home = Route::protected(client.config().home_route.clone());

    match guard.before_each(&home).await {
        Navigation::Reenter(_) | Navigation::Proceed => Ok(table.routes()),
        Navigation::Redirect(to) => anyhow::bail!("not signed in (redirected to {to})"),
    }
}
