// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment document store.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use cephalo_kv::{Control, KvStore, Watch};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::deployment::DeploymentConfig;
use crate::error::Result;

/// KV path of the deployment document.
pub const CONFIG_PATH: &str = "config.json";

/// Reads, writes and watches the [`DeploymentConfig`].
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KvStore>,
    buffer: usize,
}

impl ConfigStore {
    /// Store over `store` with the default watch buffer.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store, buffer: 16 }
    }

    /// Set how many notifications a watch may queue.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Current document, if any.
    pub async fn get(&self) -> Result<Option<DeploymentConfig>> {
        match self.store.get(CONFIG_PATH).await? {
            Some(bytes) => Ok(Some(DeploymentConfig::from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Validate and store a document.
    pub async fn save(&self, config: &DeploymentConfig) -> Result<()> {
        config.validate()?;
        self.store
            .create_or_set(CONFIG_PATH, config.to_json()?)
            .await?;
        Ok(())
    }

    /// Current document, seeding the default one if the path is empty.
    pub async fn ensure_default(&self) -> Result<DeploymentConfig> {
        if let Some(config) = self.get().await? {
            return Ok(config);
        }
        let config = DeploymentConfig::default();
        self.save(&config).await?;
        info!(path = CONFIG_PATH, "Seeded default deployment config");
        Ok(config)
    }

    /// Follow the document. The first item is the current document.
    pub async fn watch(&self) -> Result<ConfigWatch> {
        let inner = self.store.watch(CONFIG_PATH, self.buffer).await?;
        Ok(ConfigWatch { inner })
    }
}

/// Parsed deployment documents as they change.
///
/// Deletions and invalid documents are skipped. The stream ends with the
/// underlying watch.
#[derive(Debug)]
pub struct ConfigWatch {
    inner: Watch,
}

impl ConfigWatch {
    /// Cancellation and result control of the underlying watch.
    pub fn control(&self) -> &Control {
        self.inner.control()
    }
}

impl Stream for ConfigWatch {
    type Item = DeploymentConfig;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(notification) = ready!(self.inner.poll_next_unpin(cx)) else {
                return Poll::Ready(None);
            };
            let Some(bytes) = notification else {
                continue;
            };
            match DeploymentConfig::from_json(&bytes) {
                Ok(config) => return Poll::Ready(Some(config)),
                Err(e) => warn!(path = CONFIG_PATH, error = %e, "Ignoring invalid deployment config"),
            }
        }
    }
}
