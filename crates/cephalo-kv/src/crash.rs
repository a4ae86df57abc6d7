// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crash-propagating store wrapper.
//!
//! [`CrashingKvStore`] forwards every call to an inner store and latches the
//! first failure it sees, including the asynchronous loss of a held lock or an
//! active watch. After that, every call fails immediately with
//! [`KvError::AlreadyCrashed`] carrying the original cause, and the inner
//! store is never touched again. Owners observe [`CrashingKvStore::crashed`]
//! and rebuild from a fresh store instead of retrying.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::{KvError, Result};
use crate::signal::{Control, Latch};
use crate::store::{KvStore, LockHandle, Watch};

/// [`KvStore`] decorator that fails fast after the first error.
#[derive(Clone)]
pub struct CrashingKvStore {
    inner: Arc<dyn KvStore>,
    crashed: Latch,
}

impl std::fmt::Debug for CrashingKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashingKvStore")
            .field("backend", &self.inner.backend_type())
            .field("crashed", &self.crashed.peek())
            .finish()
    }
}

impl CrashingKvStore {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            crashed: Latch::new(),
        }
    }

    /// The crash signal. It only ever settles with an error.
    pub fn crashed(&self) -> &Latch {
        &self.crashed
    }

    /// Whether the store has crashed.
    pub fn is_crashed(&self) -> bool {
        self.crashed.is_settled()
    }

    fn ensure_alive(&self) -> Result<()> {
        match self.crashed.peek() {
            Some(Err(cause)) => {
                warn!(cause = %cause, "Call on crashed store");
                Err(KvError::AlreadyCrashed {
                    cause: Box::new(cause),
                })
            }
            _ => Ok(()),
        }
    }

    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            latch(&self.crashed, e.clone());
        }
        result
    }

    /// Latch the crash signal if `control` later ends with an error.
    fn observe(&self, control: &Control, kind: &'static str, path: &str) {
        let control = control.clone();
        let crashed = self.crashed.clone();
        let path = path.to_string();
        tokio::spawn(async move {
            if let Err(e) = control.wait().await {
                error!(path = %path, kind, error = %e, "Store resource lost");
                latch(&crashed, e);
            }
        });
    }
}

fn latch(crashed: &Latch, cause: KvError) {
    let message = cause.to_string();
    if crashed.settle(Err(cause)) {
        error!(error = %message, "KV store crashed");
    }
}

#[async_trait]
impl KvStore for CrashingKvStore {
    fn backend_type(&self) -> &'static str {
        self.inner.backend_type()
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_alive()?;
        let result = self.inner.get(path).await;
        self.check(result)
    }

    async fn get_all(&self, paths: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.ensure_alive()?;
        let result = self.inner.get_all(paths).await;
        self.check(result)
    }

    async fn create(&self, path: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_alive()?;
        let result = self.inner.create(path, value).await;
        self.check(result)
    }

    async fn set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_alive()?;
        let result = self.inner.set(path, value).await;
        self.check(result)
    }

    async fn create_or_set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_alive()?;
        let result = self.inner.create_or_set(path, value).await;
        self.check(result)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.ensure_alive()?;
        let result = self.inner.delete(path).await;
        self.check(result)
    }

    async fn children(&self, path: &str) -> Result<BTreeSet<String>> {
        self.ensure_alive()?;
        let result = self.inner.children(path).await;
        self.check(result)
    }

    async fn lock(&self, path: &str) -> Result<LockHandle> {
        self.ensure_alive()?;
        let handle = self.check(self.inner.lock(path).await)?;
        self.observe(handle.control(), "lock", handle.path());
        Ok(handle)
    }

    async fn watch(&self, path: &str, buffer_size: usize) -> Result<Watch> {
        self.ensure_alive()?;
        let watch = self.check(self.inner.watch(path, buffer_size).await)?;
        self.observe(watch.control(), "watch", watch.path());
        Ok(watch)
    }
}
