//! Idle session eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::id::short_id;
use super::table::SessionTable;

/// Background task that periodically evicts idle sessions.
///
/// Worst-case eviction latency is roughly `idle_timeout + interval` after
/// the last interaction.
pub struct Reaper {
    table: Arc<SessionTable>,
    idle_timeout: Duration,
    interval: Duration,
}

impl Reaper {
    pub fn new(table: Arc<SessionTable>, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            table,
            idle_timeout,
            interval,
        }
    }

    /// Spawn the sweep loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh server
            // waits a full interval before its first sweep.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep(&self.table, self.idle_timeout).await;
            }
        })
    }
}

/// One pass over the table: close and remove every session idle longer
/// than `idle_timeout`.
///
/// Each record is inspected under its own lock via `try_lock`, so a
/// session busy in a handler is never reclaimed mid-operation; it is
/// skipped and reconsidered on the next pass, by which point the handler
/// will have refreshed its activity timestamp.
///
/// Returns the number of sessions evicted.
pub async fn sweep(table: &SessionTable, idle_timeout: Duration) -> usize {
    let mut expired = Vec::new();
    for id in table.ids() {
        let removed = table.remove_if(&id, |session| {
            session
                .try_lock()
                .map(|state| state.idle_duration() > idle_timeout)
                .unwrap_or(false)
        });
        if let Some(session) = removed {
            debug!(session = short_id(&id), "evicting idle session");
            expired.push(session);
        }
    }

    for session in &expired {
        session.close().await;
    }

    if !expired.is_empty() {
        info!(evicted = expired.len(), remaining = table.len(), "reaper pass");
    }
    expired.len()
}
