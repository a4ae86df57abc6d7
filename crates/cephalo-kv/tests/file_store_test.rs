// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the local-file backend.

mod common;

use common::*;

use cephalo_kv::{FileStore, KvStore};
use tempfile::TempDir;

async fn open_store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = FileStore::open(dir.path().join("kv"))
        .await
        .expect("Failed to open file store");
    (dir, store)
}

#[tokio::test]
async fn test_crud() {
    let (_dir, store) = open_store().await;
    check_crud(&store).await;
}

#[tokio::test]
async fn test_listing() {
    let (_dir, store) = open_store().await;
    check_listing(&store).await;
}

#[tokio::test]
async fn test_watch() {
    let (_dir, store) = open_store().await;
    check_watch(&store).await;
}

#[tokio::test]
async fn test_lock_exclusive() {
    let (_dir, store) = open_store().await;
    check_lock_exclusive(&store).await;
}

#[tokio::test]
async fn test_invalid_paths() {
    let (_dir, store) = open_store().await;
    check_invalid_paths(&store).await;
}

#[tokio::test]
async fn test_values_survive_reopen() {
    let (dir, store) = open_store().await;
    store
        .create("tasks/0b5c", b"{\"id\":\"0b5c\"}".to_vec())
        .await
        .unwrap();
    drop(store);

    let reopened = FileStore::open(dir.path().join("kv")).await.unwrap();
    assert_eq!(
        reopened.get("tasks/0b5c").await.unwrap(),
        Some(b"{\"id\":\"0b5c\"}".to_vec())
    );
    assert!(reopened.children("tasks").await.unwrap().contains("0b5c"));
    assert_eq!(reopened.backend_type(), "file");
}

#[tokio::test]
async fn test_node_with_value_and_children() {
    let (_dir, store) = open_store().await;
    store.create("tasks", b"parent".to_vec()).await.unwrap();
    store.create("tasks/a", b"child".to_vec()).await.unwrap();

    store.delete("tasks").await.unwrap();

    assert_eq!(store.get("tasks").await.unwrap(), None);
    assert_eq!(store.get("tasks/a").await.unwrap(), Some(b"child".to_vec()));
}
