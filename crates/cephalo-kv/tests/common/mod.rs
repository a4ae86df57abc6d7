// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared contract checks run against every KV backend.

#![allow(dead_code)]

use std::time::Duration;

use cephalo_kv::{KvError, KvStore, Notification, Watch};

/// Wait for the next watch notification, failing the test after a second.
pub async fn next(watch: &mut Watch) -> Notification {
    tokio::time::timeout(Duration::from_secs(1), watch.recv())
        .await
        .expect("watch notification timed out")
        .expect("watch ended")
}

/// Create / set / create_or_set / delete semantics.
pub async fn check_crud(store: &dyn KvStore) {
    assert_eq!(store.get("config.json").await.unwrap(), None);

    store.create("config.json", b"v1".to_vec()).await.unwrap();
    assert_eq!(
        store.get("/config.json/").await.unwrap(),
        Some(b"v1".to_vec())
    );

    let err = store.create("config.json", b"v2".to_vec()).await.unwrap_err();
    assert!(matches!(err, KvError::AlreadyExists { .. }));

    store.set("config.json", b"v2".to_vec()).await.unwrap();
    assert_eq!(
        store.get("config.json").await.unwrap(),
        Some(b"v2".to_vec())
    );

    let err = store.set("frameworkId", b"f".to_vec()).await.unwrap_err();
    assert!(matches!(err, KvError::NotFound { .. }));

    store
        .create_or_set("frameworkId", b"f1".to_vec())
        .await
        .unwrap();
    store
        .create_or_set("frameworkId", b"f2".to_vec())
        .await
        .unwrap();
    assert_eq!(
        store.get("frameworkId").await.unwrap(),
        Some(b"f2".to_vec())
    );

    store.delete("config.json").await.unwrap();
    assert_eq!(store.get("config.json").await.unwrap(), None);
    let err = store.delete("config.json").await.unwrap_err();
    assert!(matches!(err, KvError::NotFound { .. }));
}

/// `get_all` order and `children` listing.
pub async fn check_listing(store: &dyn KvStore) {
    store.create("tasks/b", b"B".to_vec()).await.unwrap();
    store.create("tasks/a", b"A".to_vec()).await.unwrap();
    store.create("tasks/c/nested", b"N".to_vec()).await.unwrap();

    let children: Vec<String> = store.children("tasks").await.unwrap().into_iter().collect();
    assert_eq!(children, vec!["a", "b", "c"]);
    assert!(store.children("nothing/here").await.unwrap().is_empty());
    assert!(store.children("").await.unwrap().contains("tasks"));

    let values = store
        .get_all(&[
            "tasks/b".to_string(),
            "tasks/missing".to_string(),
            "tasks/a".to_string(),
        ])
        .await
        .unwrap();
    assert_eq!(
        values,
        vec![Some(b"B".to_vec()), None, Some(b"A".to_vec())]
    );
}

/// Watch delivers the current value first, then each change.
pub async fn check_watch(store: &dyn KvStore) {
    let mut watch = store.watch("config.json", 4).await.unwrap();
    assert_eq!(next(&mut watch).await, None);

    store.create("config.json", b"one".to_vec()).await.unwrap();
    assert_eq!(next(&mut watch).await, Some(b"one".to_vec()));

    store.set("config.json", b"two".to_vec()).await.unwrap();
    assert_eq!(next(&mut watch).await, Some(b"two".to_vec()));

    store.delete("config.json").await.unwrap();
    assert_eq!(next(&mut watch).await, None);

    let control = watch.control().clone();
    drop(watch);
    assert_eq!(control.wait().await, Ok(()));
}

/// A second locker waits until the first releases.
pub async fn check_lock_exclusive(store: &dyn KvStore) {
    let first = store.lock("locks/leader").await.unwrap();

    let blocked =
        tokio::time::timeout(Duration::from_millis(50), store.lock("locks/leader")).await;
    assert!(blocked.is_err(), "second lock must wait");

    let other = store.lock("locks/other").await.unwrap();
    other.release().await.unwrap();

    let control = first.control().clone();
    first.release().await.unwrap();
    assert_eq!(control.wait().await, Ok(()));

    let second = tokio::time::timeout(Duration::from_secs(1), store.lock("locks/leader"))
        .await
        .expect("lock should be granted after release")
        .unwrap();
    assert_eq!(second.path(), "locks/leader");
}

/// Malformed paths are rejected.
pub async fn check_invalid_paths(store: &dyn KvStore) {
    for path in ["", "/", "tasks//a", "tasks/../secrets"] {
        let err = store.get(path).await.unwrap_err();
        assert!(
            matches!(err, KvError::InvalidPath { .. }),
            "path {:?} should be rejected",
            path
        );
    }
}
