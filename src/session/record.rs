//! Per-session record.

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::backend::BackendConn;

/// A tunnel session: one live backend endpoint plus book-keeping.
///
/// All mutable state sits behind a single mutex; every handler action on
/// the session happens with the lock held, which serializes concurrent
/// requests sharing a session id.
pub struct Session {
    state: Mutex<SessionState>,
}

/// The lock-guarded interior of a [`Session`].
pub struct SessionState {
    /// The backend endpoint this session owns.
    pub conn: BackendConn,
    last_active: Instant,
}

impl Session {
    /// Wrap a freshly-established backend endpoint in a new record.
    pub fn new(conn: BackendConn) -> Self {
        Self {
            state: Mutex::new(SessionState {
                conn,
                last_active: Instant::now(),
            }),
        }
    }

    /// Acquire the session lock, waiting for any in-flight handler.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Acquire the session lock only if no handler currently holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, SessionState>> {
        self.state.try_lock().ok()
    }

    /// Close the backend endpoint. Waits for any in-flight handler first.
    pub async fn close(&self) {
        self.state.lock().await.conn.close().await;
    }
}

impl SessionState {
    /// Record handler activity. The timestamp only moves forward.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Time since the last handler interaction.
    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_active.elapsed()
    }
}
