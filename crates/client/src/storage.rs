// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value backends for persisted session state.
//!
//! The store writes opaque strings (already encrypted where required); the
//! backends only decide where those strings live.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::ClientError;

/// One key update: `Some` writes the value, `None` removes the key.
pub type Change<'a> = (&'a str, Option<String>);

/// String-keyed persistence used by the credential store.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> Result<(), ClientError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), ClientError>;

    fn keys(&self) -> Vec<String>;

    /// Apply `changes` in order.
    ///
    /// Backends that can persist a batch in one write override this so the
    /// batch lands whole or not at all.
    fn apply(&self, changes: Vec<Change<'_>>) -> Result<(), ClientError> {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }
}

fn merge(entries: &mut BTreeMap<String, String>, changes: Vec<Change<'_>>) {
    for (key, value) in changes {
        match value {
            Some(value) => {
                entries.insert(key.to_owned(), value);
            }
            None => {
                entries.remove(key);
            }
        }
    }
}

/// Process-lifetime storage (the session-scoped default).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), ClientError> {
        self.entries.lock().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn apply(&self, changes: Vec<Change<'_>>) -> Result<(), ClientError> {
        merge(&mut self.entries.lock(), changes);
        Ok(())
    }
}

/// Storage backed by a single JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ClientError::Storage(format!("{}: {e}", path.display())))?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| ClientError::Storage(format!("{}: {e}", path.display())))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), ClientError> {
        save_atomic(&self.path, entries)
            .map_err(|e| ClientError::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), ClientError> {
        self.apply(vec![(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.apply(vec![(key, None)])
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// One document write per batch; the cached entries change only once it
    /// is on disk.
    fn apply(&self, changes: Vec<Change<'_>>) -> Result<(), ClientError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        merge(&mut next, changes);
        if next == *entries {
            return Ok(());
        }
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

/// Write the document atomically (write tmp + rename).
///
/// The temp name carries PID and a counter so concurrent writers in one
/// process never share a temp file.
fn save_atomic(path: &Path, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(entries)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
