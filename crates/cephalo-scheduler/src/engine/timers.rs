// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-task wake-up timers.
//!
//! At most one timer is pending per task. A timer delivers
//! [`Event::Wake`] with the generation it was scheduled for; the engine
//! drops wakes whose generation no longer matches the task.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::Event;
use crate::model::TaskId;

pub(crate) struct Timers {
    events: mpsc::UnboundedSender<Event>,
    pending: HashMap<TaskId, JoinHandle<()>>,
}

impl Timers {
    pub(crate) fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            pending: HashMap::new(),
        }
    }

    /// Replace the task's timer.
    pub(crate) fn schedule(&mut self, task_id: TaskId, generation: u64, delay: Duration) {
        self.cancel(task_id);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Wake {
                task_id,
                generation,
            });
        });
        trace!(task_id = %task_id, generation, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        self.pending.insert(task_id, handle);
    }

    pub(crate) fn cancel(&mut self, task_id: TaskId) {
        if let Some(handle) = self.pending.remove(&task_id) {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

/// Exponential backoff: `base * 2^(failures - 1)`, capped at `max`.
pub(crate) fn backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        assert_eq!(backoff(1, base, max), Duration::from_secs(5));
        assert_eq!(backoff(2, base, max), Duration::from_secs(10));
        assert_eq!(backoff(4, base, max), Duration::from_secs(40));
        assert_eq!(backoff(7, base, max), Duration::from_secs(300));
        assert_eq!(backoff(1000, base, max), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);
        let task_id = uuid::Uuid::new_v4();

        timers.schedule(task_id, 1, Duration::from_secs(10));
        timers.cancel(task_id);
        timers.schedule(task_id, 2, Duration::from_secs(20));

        match rx.recv().await {
            Some(Event::Wake { generation, .. }) => assert_eq!(generation, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
