// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the in-memory backend.

mod common;

use common::*;

use cephalo_kv::{KvError, KvStore, MemoryStore};

// ============================================================================
// Store contract
// ============================================================================

#[tokio::test]
async fn test_crud() {
    check_crud(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_listing() {
    check_listing(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_watch() {
    check_watch(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_lock_exclusive() {
    check_lock_exclusive(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_invalid_paths() {
    check_invalid_paths(&MemoryStore::new()).await;
}

// ============================================================================
// Session loss
// ============================================================================

#[tokio::test]
async fn test_session_loss_fails_held_lock() {
    let store = MemoryStore::new();
    let lock = store.lock("locks/leader").await.unwrap();

    store.expire_session();

    assert_eq!(
        lock.control().wait().await,
        Err(KvError::LockLost {
            path: "locks/leader".to_string()
        })
    );
}

#[tokio::test]
async fn test_session_loss_closes_watch() {
    let store = MemoryStore::new();
    let mut watch = store.watch("config.json", 1).await.unwrap();
    assert_eq!(next(&mut watch).await, None);

    store.expire_session();

    let result = watch.control().wait().await;
    assert!(matches!(result, Err(KvError::WatchClosed { .. })));
    assert_eq!(watch.recv().await, None);
}

#[tokio::test]
async fn test_session_loss_rejects_later_calls() {
    let store = MemoryStore::new();
    store.create("a", b"1".to_vec()).await.unwrap();

    store.expire_session();

    assert_eq!(store.get("a").await, Err(KvError::SessionExpired));
    assert_eq!(
        store.create_or_set("a", b"2".to_vec()).await,
        Err(KvError::SessionExpired)
    );
    assert!(matches!(
        store.watch("a", 1).await,
        Err(KvError::SessionExpired)
    ));
}

#[tokio::test]
async fn test_slow_watcher_sees_latest_value() {
    let store = MemoryStore::new();
    let mut watch = store.watch("counter", 1).await.unwrap();

    for i in 0..10u8 {
        store.create_or_set("counter", vec![i]).await.unwrap();
    }

    let mut last = None;
    while last != Some(Some(vec![9u8])) {
        last = Some(next(&mut watch).await);
    }
    assert_eq!(store.get("counter").await.unwrap(), Some(vec![9u8]));
}
