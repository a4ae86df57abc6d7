// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cephalo_kv::{CrashingKvStore, FileStore, KvStore, MemoryStore};

/// Default container image for Ceph daemons.
pub const DEFAULT_CEPH_IMAGE: &str = "ceph/daemon:tag-build-master-jewel-ubuntu-14.04";

/// KV backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    /// Process-local, lost on restart.
    Memory,
    /// Directory tree under `data_dir`.
    File,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the Ceph cluster
    pub cluster_name: String,
    /// Resource role reservations are made for
    pub role: String,
    /// Principal reservations and volumes are made by
    pub principal: String,
    /// Container image for monitors and OSDs
    pub ceph_image: String,
    /// KV backend
    pub kv_backend: KvBackend,
    /// Data directory for the file backend
    pub data_dir: PathBuf,
    /// How long a reservation may stay unconfirmed
    pub reservation_timeout: Duration,
    /// How long restart recovery waits for a status
    pub reconcile_timeout: Duration,
    /// First crash backoff delay
    pub backoff_base: Duration,
    /// Upper bound for crash backoff
    pub backoff_max: Duration,
    /// Notifications buffered per watch
    pub watch_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_name: "ceph".to_string(),
            role: "ceph".to_string(),
            principal: "ceph".to_string(),
            ceph_image: DEFAULT_CEPH_IMAGE.to_string(),
            kv_backend: KvBackend::Memory,
            data_dir: PathBuf::from(".data"),
            reservation_timeout: Duration::from_secs(30),
            reconcile_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            watch_buffer: 16,
        }
    }
}

fn secs(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(name, "must be a whole number of seconds"))?;
    if secs == 0 {
        return Err(ConfigError::Invalid(name, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn non_empty(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `CEPHALO_CLUSTER_NAME`: Ceph cluster name (default: ceph)
    /// - `CEPHALO_ROLE`: reservation role (default: ceph)
    /// - `CEPHALO_PRINCIPAL`: reservation principal (default: ceph)
    /// - `CEPHALO_CEPH_IMAGE`: daemon container image
    /// - `CEPHALO_KV_BACKEND`: `memory` or `file` (default: memory)
    /// - `CEPHALO_DATA_DIR`: file backend root (default: .data)
    /// - `CEPHALO_RESERVATION_TIMEOUT_SECS` (default: 30)
    /// - `CEPHALO_RECONCILE_TIMEOUT_SECS` (default: 60)
    /// - `CEPHALO_BACKOFF_BASE_SECS` (default: 5)
    /// - `CEPHALO_BACKOFF_MAX_SECS` (default: 300)
    /// - `CEPHALO_WATCH_BUFFER` (default: 16)
    pub fn from_env() -> Result<Self, ConfigError> {
        let kv_backend = match std::env::var("CEPHALO_KV_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => KvBackend::Memory,
            "file" => KvBackend::File,
            _ => {
                return Err(ConfigError::Invalid(
                    "CEPHALO_KV_BACKEND",
                    "must be 'memory' or 'file'",
                ));
            }
        };

        let backoff_base = secs("CEPHALO_BACKOFF_BASE_SECS", "5")?;
        let backoff_max = secs("CEPHALO_BACKOFF_MAX_SECS", "300")?;
        if backoff_max < backoff_base {
            return Err(ConfigError::Invalid(
                "CEPHALO_BACKOFF_MAX_SECS",
                "must not be lower than CEPHALO_BACKOFF_BASE_SECS",
            ));
        }

        let watch_buffer: usize = std::env::var("CEPHALO_WATCH_BUFFER")
            .unwrap_or_else(|_| "16".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "CEPHALO_WATCH_BUFFER",
                "must be a positive integer",
            ))?;

        Ok(Self {
            cluster_name: non_empty("CEPHALO_CLUSTER_NAME", "ceph")?,
            role: non_empty("CEPHALO_ROLE", "ceph")?,
            principal: non_empty("CEPHALO_PRINCIPAL", "ceph")?,
            ceph_image: non_empty("CEPHALO_CEPH_IMAGE", DEFAULT_CEPH_IMAGE)?,
            kv_backend,
            data_dir: PathBuf::from(
                std::env::var("CEPHALO_DATA_DIR").unwrap_or_else(|_| ".data".to_string()),
            ),
            reservation_timeout: secs("CEPHALO_RESERVATION_TIMEOUT_SECS", "30")?,
            reconcile_timeout: secs("CEPHALO_RECONCILE_TIMEOUT_SECS", "60")?,
            backoff_base,
            backoff_max,
            watch_buffer,
        })
    }

    /// Open the configured backend behind a crash-propagating wrapper.
    pub async fn open_store(&self) -> crate::error::Result<CrashingKvStore> {
        let inner: Arc<dyn KvStore> = match self.kv_backend {
            KvBackend::Memory => Arc::new(MemoryStore::new()),
            KvBackend::File => Arc::new(FileStore::open(self.data_dir.join("kv")).await?),
        };
        tracing::info!(backend = inner.backend_type(), "Opened KV store");
        Ok(CrashingKvStore::new(inner))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that touch the process environment
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "CEPHALO_CLUSTER_NAME",
        "CEPHALO_ROLE",
        "CEPHALO_PRINCIPAL",
        "CEPHALO_CEPH_IMAGE",
        "CEPHALO_KV_BACKEND",
        "CEPHALO_DATA_DIR",
        "CEPHALO_RESERVATION_TIMEOUT_SECS",
        "CEPHALO_RECONCILE_TIMEOUT_SECS",
        "CEPHALO_BACKOFF_BASE_SECS",
        "CEPHALO_BACKOFF_MAX_SECS",
        "CEPHALO_WATCH_BUFFER",
    ];

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Start from a clean slate for every cephalo variable.
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();

        assert_eq!(config.cluster_name, "ceph");
        assert_eq!(config.role, "ceph");
        assert_eq!(config.principal, "ceph");
        assert_eq!(config.ceph_image, DEFAULT_CEPH_IMAGE);
        assert_eq!(config.kv_backend, KvBackend::Memory);
        assert_eq!(config.data_dir, PathBuf::from(".data"));
        assert_eq!(config.reservation_timeout, Duration::from_secs(30));
        assert_eq!(config.reconcile_timeout, Duration::from_secs(60));
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.backoff_max, Duration::from_secs(300));
        assert_eq!(config.watch_buffer, 16);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("CEPHALO_CLUSTER_NAME", "prod");
        guard.set("CEPHALO_ROLE", "storage");
        guard.set("CEPHALO_KV_BACKEND", "FILE");
        guard.set("CEPHALO_DATA_DIR", "/var/lib/cephalo");
        guard.set("CEPHALO_RESERVATION_TIMEOUT_SECS", "10");
        guard.set("CEPHALO_BACKOFF_BASE_SECS", "2");
        guard.set("CEPHALO_BACKOFF_MAX_SECS", "20");
        guard.set("CEPHALO_WATCH_BUFFER", "4");

        let config = Config::from_env().unwrap();

        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.role, "storage");
        assert_eq!(config.kv_backend, KvBackend::File);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/cephalo"));
        assert_eq!(config.reservation_timeout, Duration::from_secs(10));
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert_eq!(config.backoff_max, Duration::from_secs(20));
        assert_eq!(config.watch_buffer, 4);
    }

    #[test]
    fn test_config_invalid_backend() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("CEPHALO_KV_BACKEND", "zookeeper");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("CEPHALO_KV_BACKEND", _)));
    }

    #[test]
    fn test_config_invalid_timeouts() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("CEPHALO_RECONCILE_TIMEOUT_SECS", "soon");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("CEPHALO_RECONCILE_TIMEOUT_SECS", _)
        ));

        guard.set("CEPHALO_RECONCILE_TIMEOUT_SECS", "0");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_backoff_bounds() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("CEPHALO_BACKOFF_BASE_SECS", "60");
        guard.set("CEPHALO_BACKOFF_MAX_SECS", "30");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("CEPHALO_BACKOFF_MAX_SECS"));
    }

    #[test]
    fn test_config_empty_cluster_name() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("CEPHALO_CLUSTER_NAME", "  ");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CEPHALO_CLUSTER_NAME")));
    }

    #[tokio::test]
    async fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            kv_backend: KvBackend::File,
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let store = config.open_store().await.unwrap();
        assert_eq!(store.backend_type(), "file");
        assert!(!store.is_crashed());
    }
}
