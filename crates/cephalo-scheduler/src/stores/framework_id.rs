// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framework id store.

use std::sync::Arc;

use cephalo_kv::KvStore;

use crate::error::Result;

/// KV path of the framework id.
pub const FRAMEWORK_ID_PATH: &str = "frameworkId";

/// Remembers the id the cluster scheduler assigned to this framework.
#[derive(Clone)]
pub struct FrameworkIdStore {
    store: Arc<dyn KvStore>,
}

impl FrameworkIdStore {
    /// Store over `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Stored id, if registered before.
    pub async fn get(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(FRAMEWORK_ID_PATH)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Store the id.
    pub async fn set(&self, framework_id: &str) -> Result<()> {
        self.store
            .create_or_set(FRAMEWORK_ID_PATH, framework_id.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}
