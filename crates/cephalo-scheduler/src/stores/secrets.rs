// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster identity and cephx keys.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cephalo_kv::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{decode, encode};
use crate::error::Result;

/// KV path of the cluster secrets.
pub const SECRETS_PATH: &str = "secrets.json";

/// Generated once per cluster and shared by every daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSecrets {
    /// Cluster fsid.
    pub fsid: Uuid,
    /// Key of `client.admin`.
    pub admin_key: String,
    /// Key of `mon.`.
    pub mon_key: String,
}

impl ClusterSecrets {
    /// Fresh fsid and keys.
    pub fn generate() -> Self {
        Self {
            fsid: Uuid::new_v4(),
            admin_key: generate_key(),
            mon_key: generate_key(),
        }
    }
}

/// A cephx secret in the keyring encoding.
///
/// Layout (little endian): key type `u16` (1 = AES), creation seconds `u32`,
/// nanoseconds `u32`, secret length `u16`, then the 16 secret bytes.
pub fn generate_key() -> String {
    let now = Utc::now();
    let secret = Uuid::new_v4();

    let mut buf = Vec::with_capacity(28);
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&(now.timestamp() as u32).to_le_bytes());
    buf.extend_from_slice(&now.timestamp_subsec_nanos().to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(secret.as_bytes());
    STANDARD.encode(buf)
}

/// Stores [`ClusterSecrets`].
#[derive(Clone)]
pub struct SecretStore {
    store: Arc<dyn KvStore>,
}

impl SecretStore {
    /// Store over `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Stored secrets, generating and storing them on first use.
    pub async fn get_or_create(&self) -> Result<ClusterSecrets> {
        if let Some(bytes) = self.store.get(SECRETS_PATH).await? {
            return Ok(decode(SECRETS_PATH, &bytes)?);
        }
        let secrets = ClusterSecrets::generate();
        self.store
            .create_or_set(SECRETS_PATH, encode(SECRETS_PATH, &secrets)?)
            .await?;
        info!(fsid = %secrets.fsid, "Generated cluster secrets");
        Ok(secrets)
    }
}
