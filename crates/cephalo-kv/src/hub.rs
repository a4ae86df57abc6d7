// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-local watch and lock plumbing shared by the in-process backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{KvError, Result};
use crate::signal::{Control, Latch};
use crate::store::{LockHandle, Notification, Watch};

fn lock_map<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-path change channels.
#[derive(Debug, Default)]
pub(crate) struct WatchHub {
    channels: Mutex<HashMap<String, watch::Sender<Notification>>>,
}

impl WatchHub {
    /// Record a new value for `path`, waking every watcher.
    pub(crate) fn publish(&self, path: &str, value: Notification) {
        let channels = lock_map(&self.channels);
        if let Some(tx) = channels.get(path) {
            tx.send_replace(value);
        }
    }

    /// Start forwarding changes of `path` into a new [`Watch`].
    ///
    /// `current` must be read under the same serialization the backend uses
    /// for `publish`, so the first notification is never older than a later one.
    pub(crate) fn subscribe(
        &self,
        path: &str,
        current: Notification,
        buffer_size: usize,
        session: &Latch,
    ) -> Watch {
        let mut source = {
            let mut channels = lock_map(&self.channels);
            let tx = channels
                .entry(path.to_string())
                .or_insert_with(|| watch::channel(current.clone()).0);
            tx.send_if_modified(|value| {
                if *value == current {
                    return false;
                }
                *value = current;
                true
            });
            tx.subscribe()
        };
        let initial = source.borrow_and_update().clone();

        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let control = Control::new();
        tokio::spawn(forward(
            path.to_string(),
            initial,
            source,
            tx,
            control.clone(),
            session.clone(),
        ));
        Watch::new(path, rx, control)
    }
}

async fn forward(
    path: String,
    initial: Notification,
    mut source: watch::Receiver<Notification>,
    tx: mpsc::Sender<Notification>,
    control: Control,
    session: Latch,
) {
    let mut pending = Some(initial);

    loop {
        if let Some(value) = pending.take() {
            tokio::select! {
                biased;

                _ = control.cancelled() => {
                    control.result().settle(Ok(()));
                    return;
                }

                _ = session.wait() => {
                    control.result().settle(Err(KvError::WatchClosed {
                        path,
                        reason: "session expired".to_string(),
                    }));
                    return;
                }

                sent = tx.send(value) => {
                    if sent.is_err() {
                        debug!(path = %path, "Watch receiver dropped");
                        control.result().settle(Ok(()));
                        return;
                    }
                }
            }
        }

        tokio::select! {
            biased;

            _ = control.cancelled() => {
                control.result().settle(Ok(()));
                return;
            }

            _ = session.wait() => {
                control.result().settle(Err(KvError::WatchClosed {
                    path,
                    reason: "session expired".to_string(),
                }));
                return;
            }

            _ = tx.closed() => {
                debug!(path = %path, "Watch receiver dropped");
                control.result().settle(Ok(()));
                return;
            }

            changed = source.changed() => {
                if changed.is_err() {
                    control.result().settle(Err(KvError::WatchClosed {
                        path,
                        reason: "store dropped".to_string(),
                    }));
                    return;
                }
                pending = Some(source.borrow_and_update().clone());
            }
        }
    }
}

/// Per-path exclusive locks with FIFO waiters.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockTable {
    /// Wait for the lock on `path`, then hold it until the handle is released
    /// or the session is lost.
    pub(crate) async fn acquire(&self, path: &str, session: &Latch) -> Result<LockHandle> {
        let mutex = lock_map(&self.locks)
            .entry(path.to_string())
            .or_default()
            .clone();

        let guard = tokio::select! {
            biased;

            _ = session.wait() => return Err(KvError::SessionExpired),
            guard = mutex.lock_owned() => guard,
        };

        let control = Control::new();
        let holder = control.clone();
        let session = session.clone();
        let locked_path = path.to_string();
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = holder.cancelled() => {
                    drop(guard);
                    holder.result().settle(Ok(()));
                }

                _ = session.wait() => {
                    drop(guard);
                    holder.result().settle(Err(KvError::LockLost { path: locked_path }));
                }
            }
        });

        debug!(path = %path, "Lock acquired");
        Ok(LockHandle::new(path, control))
    }
}
