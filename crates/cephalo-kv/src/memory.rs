// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory KV backend.
//!
//! Single-process store used by tests and by deployments that do not need
//! durable state. A simulated coordination session can be expired to exercise
//! the store-fatal paths of locks and watches.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{KvError, Result};
use crate::hub::{LockTable, WatchHub};
use crate::path::{child_of, normalize};
use crate::signal::Latch;
use crate::store::{KvStore, LockHandle, Watch};

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Vec<u8>>>,
    hub: WatchHub,
    locks: LockTable,
    session: Latch,
}

impl MemoryStore {
    /// Create an empty store with a live session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate loss of the coordination session.
    ///
    /// Held locks fail with `LockLost`, active watches end with `WatchClosed`
    /// and every later call fails with `SessionExpired`.
    pub fn expire_session(&self) {
        if self.session.settle(Err(KvError::SessionExpired)) {
            warn!("Memory store session expired");
        }
    }

    fn values(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        if self.session.is_settled() {
            return Err(KvError::SessionExpired);
        }
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize(path, false)?;
        Ok(self.values()?.get(&path).cloned())
    }

    async fn create(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let path = normalize(path, false)?;
        let mut values = self.values()?;
        if values.contains_key(&path) {
            return Err(KvError::AlreadyExists { path });
        }
        values.insert(path.clone(), value.clone());
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let path = normalize(path, false)?;
        let mut values = self.values()?;
        match values.get_mut(&path) {
            Some(slot) => *slot = value.clone(),
            None => return Err(KvError::NotFound { path }),
        }
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn create_or_set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let path = normalize(path, false)?;
        let mut values = self.values()?;
        values.insert(path.clone(), value.clone());
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path, false)?;
        let mut values = self.values()?;
        if values.remove(&path).is_none() {
            return Err(KvError::NotFound { path });
        }
        self.hub.publish(&path, None);
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<BTreeSet<String>> {
        let parent = normalize(path, true)?;
        let values = self.values()?;
        let names = values
            .range(parent.clone()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(parent.as_str()))
            .filter_map(|key| child_of(&parent, key))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    async fn lock(&self, path: &str) -> Result<LockHandle> {
        let path = normalize(path, false)?;
        if self.session.is_settled() {
            return Err(KvError::SessionExpired);
        }
        self.locks.acquire(&path, &self.session).await
    }

    async fn watch(&self, path: &str, buffer_size: usize) -> Result<Watch> {
        let path = normalize(path, false)?;
        let values = self.values()?;
        let current = values.get(&path).cloned();
        Ok(self
            .hub
            .subscribe(&path, current, buffer_size, &self.session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_children_ignores_sibling_prefixes() {
        let store = MemoryStore::new();
        store.create("tasks/a", b"1".to_vec()).await.unwrap();
        store.create("tasks/b/c", b"2".to_vec()).await.unwrap();
        store.create("taskset/x", b"3".to_vec()).await.unwrap();

        let names = store.children("tasks").await.unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_expired_session_rejects_calls() {
        let store = MemoryStore::new();
        store.expire_session();
        assert_eq!(store.get("a").await, Err(KvError::SessionExpired));
        assert!(matches!(store.lock("a").await, Err(KvError::SessionExpired)));
    }
}
