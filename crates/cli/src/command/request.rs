// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;

use adminplus_client::{RequestDescriptor, SessionClient};

use crate::config::RequestArgs;

pub fn descriptor(args: &RequestArgs) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::new(args.method.clone(), args.path.clone());
    if let Some(ref body) = args.data {
        descriptor = descriptor.with_body(body.clone());
    }
    for (key, value) in &args.query {
        descriptor = descriptor.with_query(key.clone(), value.clone());
    }
    descriptor
}

/// Send the request through the session client and return the payload.
pub async fn request(client: &SessionClient, args: &RequestArgs) -> anyhow::Result<Value> {
    Ok(client.send(descriptor(args)).await?)
}
