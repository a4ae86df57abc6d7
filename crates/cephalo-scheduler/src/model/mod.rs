// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model shared by the engine, stores and transport.

pub mod offer;
pub mod status;
pub mod task;

pub use offer::*;
pub use status::*;
pub use task::*;
