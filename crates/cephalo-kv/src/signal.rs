// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Settle-once signals and cancellation controls.
//!
//! A [`Latch`] holds at most one outcome. The first `settle` wins and every
//! later attempt is ignored, so all observers agree on a single cause.
//! A [`Control`] pairs a latch with a cancellation flag and is returned with
//! every lock and watch.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::KvError;

/// Settle-once outcome cell.
#[derive(Debug, Clone)]
pub struct Latch {
    tx: Arc<watch::Sender<Option<Result<(), KvError>>>>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    /// Create an unsettled latch.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Settle the latch. Returns `false` if it was already settled.
    pub fn settle(&self, outcome: Result<(), KvError>) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Current outcome, if settled.
    pub fn peek(&self) -> Option<Result<(), KvError>> {
        self.tx.borrow().clone()
    }

    /// Whether an outcome has been recorded.
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the latch settles and return its outcome.
    pub async fn wait(&self) -> Result<(), KvError> {
        let mut rx = self.tx.subscribe();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Ok(()))
    }
}

/// Cancellation flag plus result latch for a long-lived store resource.
#[derive(Debug, Clone)]
pub struct Control {
    cancel: Arc<watch::Sender<bool>>,
    result: Latch,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    /// Create a live control.
    pub fn new() -> Self {
        let (cancel, _rx) = watch::channel(false);
        Self {
            cancel: Arc::new(cancel),
            result: Latch::new(),
        }
    }

    /// Request cancellation. The owning backend settles the result `Ok`.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// The result latch, settled when the resource is released or lost.
    pub fn result(&self) -> &Latch {
        &self.result
    }

    /// Wait for the resource to end.
    pub async fn wait(&self) -> Result<(), KvError> {
        self.result.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_settle_wins() {
        let latch = Latch::new();
        assert!(!latch.is_settled());

        assert!(latch.settle(Err(KvError::SessionExpired)));
        assert!(!latch.settle(Ok(())));
        assert!(!latch.settle(Err(KvError::LockLost {
            path: "x".to_string()
        })));

        assert_eq!(latch.peek(), Some(Err(KvError::SessionExpired)));
        assert_eq!(latch.wait().await, Err(KvError::SessionExpired));
    }

    #[tokio::test]
    async fn test_wait_resolves_after_settle() {
        let latch = Latch::new();
        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };

        tokio::task::yield_now().await;
        latch.settle(Ok(()));

        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_control_cancel() {
        let control = Control::new();
        assert!(!control.is_cancelled());

        let observer = {
            let control = control.clone();
            tokio::spawn(async move { control.cancelled().await })
        };
        control.cancel();
        observer.await.unwrap();

        assert!(control.is_cancelled());
        assert!(!control.result().is_settled());
    }
}
