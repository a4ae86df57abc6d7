// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheduler transport contract.
//!
//! The engine talks to the cluster scheduler only through [`SchedulerDriver`].
//! Offers and status updates flow the other way as engine events.

pub mod mock;
mod traits;

pub use mock::{DriverCall, MockDriver};
pub use traits::*;
