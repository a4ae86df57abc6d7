// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed stores over the KV coordination layer.
//!
//! | Store | Path |
//! |-------|------|
//! | [`ConfigStore`] | `config.json` |
//! | [`TaskStore`] | `tasks/<task id>` |
//! | [`FrameworkIdStore`] | `frameworkId` |
//! | [`SecretStore`] | `secrets.json` |
//!
//! Callers usually hand these a [`CrashingKvStore`](cephalo_kv::CrashingKvStore),
//! which treats every failed call as fatal. The stores therefore check for
//! presence first instead of relying on `NotFound` or `AlreadyExists`.

mod config_store;
mod framework_id;
mod secrets;
mod task_store;

pub use config_store::{CONFIG_PATH, ConfigStore, ConfigWatch};
pub use framework_id::{FRAMEWORK_ID_PATH, FrameworkIdStore};
pub use secrets::{ClusterSecrets, SECRETS_PATH, SecretStore, generate_key};
pub use task_store::{TASKS_PATH, TaskStore};

use cephalo_kv::KvError;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) fn encode<T: Serialize>(path: &str, value: &T) -> Result<Vec<u8>, KvError> {
    serde_json::to_vec(value).map_err(|e| KvError::Codec {
        path: path.to_string(),
        details: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, KvError> {
    serde_json::from_slice(bytes).map_err(|e| KvError::Codec {
        path: path.to_string(),
        details: e.to_string(),
    })
}
