// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cephalo KV - Coordination Layer
//!
//! Hierarchical key/value store used by the cephalo scheduler for durable
//! state, exclusive locks and change notification.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │              cephalo-scheduler (typed stores)                │
//! │      ConfigStore · TaskStore · FrameworkIdStore · Secrets     │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CrashingKvStore                         │
//! │   first failure latches · later calls fail AlreadyCrashed    │
//! │   lock / watch results observed in the background            │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌────────────────────────┐          ┌──────────────────────────┐
//! │      MemoryStore       │    or    │        FileStore         │
//! │  (session can expire)  │          │  (dir per node, atomic)  │
//! └────────────────────────┘          └──────────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Absent value | Present value |
//! |-----------|--------------|---------------|
//! | `get` | `Ok(None)` | `Ok(Some(bytes))` |
//! | `create` | writes | `AlreadyExists` |
//! | `set` | `NotFound` | writes |
//! | `create_or_set` | writes | writes |
//! | `delete` | `NotFound` | removes |
//!
//! `get_all` returns one entry per input path, in input order. `children`
//! lists direct child names. `lock` and `watch` return handles whose
//! [`Control`] carries a cancellation flag and a settle-once result.
//!
//! # Failure Model
//!
//! Once [`CrashingKvStore::crashed`] settles, the store must not be reused.
//! Every component holding locks or watches through it should stop, and the
//! owner should rebuild on a fresh backend.

#![deny(missing_docs)]

/// Crash-propagating wrapper.
pub mod crash;

/// Error types.
pub mod error;

/// Local-file backend.
pub mod file;

/// In-memory backend.
pub mod memory;

/// Path normalization helpers.
pub mod path;

/// Settle-once latches and cancellation controls.
pub mod signal;

/// Store trait, lock handles and watches.
pub mod store;

mod hub;

pub use crash::CrashingKvStore;
pub use error::{KvError, Result};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use signal::{Control, Latch};
pub use store::{KvStore, LockHandle, Notification, Watch};
