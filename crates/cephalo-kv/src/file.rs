// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local-file KV backend.
//!
//! Every node is a directory under the store root. A node's value lives in a
//! `__value` file inside its directory, so a node can hold a value and
//! children at the same time. Writes go to a temp file first and are renamed
//! into place. Locks and watches are process-local.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{KvError, Result};
use crate::hub::{LockTable, WatchHub};
use crate::path::normalize;
use crate::signal::Latch;
use crate::store::{KvStore, LockHandle, Watch};

const VALUE_FILE: &str = "__value";
const TEMP_FILE: &str = "__value.tmp";

/// Directory-backed [`KvStore`].
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
    hub: WatchHub,
    locks: LockTable,
    session: Latch,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| KvError::io(format!("create {}", root.display()), e))?;
        info!(root = %root.display(), "Opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            hub: WatchHub::default(),
            locks: LockTable::default(),
            session: Latch::new(),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn node_dir(&self, path: &str, allow_root: bool) -> Result<(String, PathBuf)> {
        let path = normalize(path, allow_root)?;
        let mut dir = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment.starts_with("__") {
                return Err(KvError::InvalidPath {
                    path: path.clone(),
                    reason: "segments starting with '__' are reserved",
                });
            }
            dir.push(segment);
        }
        Ok((path, dir))
    }

    async fn read_value(dir: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(dir.join(VALUE_FILE)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KvError::io(format!("read {}", dir.display()), e)),
        }
    }

    async fn write_value(dir: &Path, value: &[u8]) -> Result<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| KvError::io(format!("create {}", dir.display()), e))?;
        let temp = dir.join(TEMP_FILE);
        fs::write(&temp, value)
            .await
            .map_err(|e| KvError::io(format!("write {}", temp.display()), e))?;
        fs::rename(&temp, dir.join(VALUE_FILE))
            .await
            .map_err(|e| KvError::io(format!("rename {}", temp.display()), e))
    }

    /// Remove now-empty node directories from `dir` up to (not including) the root.
    async fn prune(&self, dir: &Path) {
        let mut current = Some(dir);
        while let Some(path) = current {
            if path == self.root || fs::remove_dir(path).await.is_err() {
                break;
            }
            current = path.parent();
        }
    }
}

#[async_trait]
impl KvStore for FileStore {
    fn backend_type(&self) -> &'static str {
        "file"
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let (_, dir) = self.node_dir(path, false)?;
        Self::read_value(&dir).await
    }

    async fn create(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let (path, dir) = self.node_dir(path, false)?;
        let _guard = self.write_lock.lock().await;
        if Self::read_value(&dir).await?.is_some() {
            return Err(KvError::AlreadyExists { path });
        }
        Self::write_value(&dir, &value).await?;
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let (path, dir) = self.node_dir(path, false)?;
        let _guard = self.write_lock.lock().await;
        if Self::read_value(&dir).await?.is_none() {
            return Err(KvError::NotFound { path });
        }
        Self::write_value(&dir, &value).await?;
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn create_or_set(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let (path, dir) = self.node_dir(path, false)?;
        let _guard = self.write_lock.lock().await;
        Self::write_value(&dir, &value).await?;
        self.hub.publish(&path, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (path, dir) = self.node_dir(path, false)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(dir.join(VALUE_FILE)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KvError::NotFound { path });
            }
            Err(e) => return Err(KvError::io(format!("delete {}", dir.display()), e)),
        }
        self.prune(&dir).await;
        self.hub.publish(&path, None);
        debug!(path = %path, "Deleted file store node");
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<BTreeSet<String>> {
        let (_, dir) = self.node_dir(path, true)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(KvError::io(format!("list {}", dir.display()), e)),
        };

        let mut names = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KvError::io(format!("list {}", dir.display()), e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| KvError::io(format!("stat {}", dir.display()), e))?
                .is_dir();
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn lock(&self, path: &str) -> Result<LockHandle> {
        let (path, _) = self.node_dir(path, false)?;
        self.locks.acquire(&path, &self.session).await
    }

    async fn watch(&self, path: &str, buffer_size: usize) -> Result<Watch> {
        let (path, dir) = self.node_dir(path, false)?;
        let _guard = self.write_lock.lock().await;
        let current = Self::read_value(&dir).await?;
        Ok(self
            .hub
            .subscribe(&path, current, buffer_size, &self.session))
    }
}
