// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! KV store trait definitions.
//!
//! Defines the abstract interface shared by every backend and by the
//! crash-propagating wrapper.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::future::try_join_all;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::signal::Control;

/// A value change observed by a watch. `None` means absent (deleted or never created).
pub type Notification = Option<Vec<u8>>;

/// Hierarchical key/value store.
///
/// Paths are slash-delimited strings, values are opaque bytes. Every operation
/// is asynchronous and may fail; callers decide which failures are recoverable.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Backend identifier (e.g., "memory", "file").
    fn backend_type(&self) -> &'static str;

    /// Read the value at `path`. Absent values are `Ok(None)`.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Read several paths, one result per input path, in input order.
    ///
    /// Reads are independent: the batch may observe each path at a different
    /// point in time.
    async fn get_all(&self, paths: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        try_join_all(paths.iter().map(|path| self.get(path))).await
    }

    /// Create a value. Fails with `AlreadyExists` if one is present.
    async fn create(&self, path: &str, value: Vec<u8>) -> Result<()>;

    /// Replace a value. Fails with `NotFound` if none is present.
    async fn set(&self, path: &str, value: Vec<u8>) -> Result<()>;

    /// Create or replace a value.
    async fn create_or_set(&self, path: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a value. Fails with `NotFound` if none is present.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Names of the direct children of `path`.
    async fn children(&self, path: &str) -> Result<BTreeSet<String>>;

    /// Acquire the exclusive lock for `path`, waiting until it is granted.
    async fn lock(&self, path: &str) -> Result<LockHandle>;

    /// Subscribe to changes of `path`.
    ///
    /// The first notification carries the current value. At most `buffer_size`
    /// notifications are queued for a slow consumer.
    async fn watch(&self, path: &str, buffer_size: usize) -> Result<Watch>;
}

/// A held lock.
///
/// The lock is held until [`release`](Self::release) is called, the handle is
/// dropped, or the backend loses it (the control result then fails).
#[derive(Debug)]
pub struct LockHandle {
    path: String,
    control: Control,
}

impl LockHandle {
    /// Wrap a backend control for `path`.
    pub fn new(path: impl Into<String>, control: Control) -> Self {
        Self {
            path: path.into(),
            control,
        }
    }

    /// The locked path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cancellation and result control.
    pub fn control(&self) -> &Control {
        &self.control
    }

    /// Release the lock and wait for the backend to confirm.
    pub async fn release(self) -> Result<()> {
        self.control.cancel();
        self.control.wait().await
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.control.cancel();
    }
}

/// A live stream of notifications for one path.
#[derive(Debug)]
pub struct Watch {
    path: String,
    rx: mpsc::Receiver<Notification>,
    control: Control,
}

impl Watch {
    /// Wrap a backend notification channel for `path`.
    pub fn new(path: impl Into<String>, rx: mpsc::Receiver<Notification>, control: Control) -> Self {
        Self {
            path: path.into(),
            rx,
            control,
        }
    }

    /// The watched path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cancellation and result control.
    pub fn control(&self) -> &Control {
        &self.control
    }

    /// Wait for the next notification. `None` once the watch has ended.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Stream for Watch {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
