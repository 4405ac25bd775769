// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request descriptors and the server's response envelope.

pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use reqwest::Method;

use crate::error::ClientError;

/// Anti-forgery header sent on mutating requests.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Envelope `code` that means success.
pub const SUCCESS_CODE: i64 = 200;

/// Everything needed to (re)issue a request. Replays reuse it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, query: Vec::new() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// POST/PUT/DELETE/PATCH carry the anti-forgery token.
    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::DELETE | Method::PATCH)
    }
}

/// Server response envelope `{ code, message, data, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Envelope {
    /// `code == 200` yields `data`; anything else is a domain error.
    pub fn into_result(self) -> Result<Value, ClientError> {
        if self.code == SUCCESS_CODE {
            return Ok(self.data);
        }
        let message =
            self.message.filter(|m| !m.is_empty()).unwrap_or_else(|| "request failed".to_owned());
        Err(ClientError::Domain { code: self.code, message })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
