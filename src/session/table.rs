//! Concurrent session table.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::id::short_id;
use super::record::Session;
use crate::backend::BackendConn;

/// Thread-safe mapping from session id to live session record.
///
/// Lookup, insert-if-absent and removal are each atomic with respect to
/// one another, which is what makes the duplicate-dial race on first
/// contact resolvable: exactly one insertion wins and the loser's
/// freshly-established backend is closed.
pub struct SessionTable {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Look up the session for `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Store `conn` under `id` unless a record already exists.
    ///
    /// Returns the record now mapped to `id`. When a concurrent insertion
    /// won the race, the caller's `conn` is closed and the incumbent
    /// returned instead.
    pub async fn insert_or_adopt(&self, id: &str, conn: BackendConn) -> Arc<Session> {
        let mut lost = None;
        let session = match self.sessions.entry(id.to_owned()) {
            Entry::Occupied(entry) => {
                lost = Some(conn);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(conn));
                entry.insert(Arc::clone(&session));
                session
            }
        };
        if let Some(mut conn) = lost {
            debug!(session = short_id(id), "lost insertion race, closing duplicate backend");
            conn.close().await;
        }
        session
    }

    /// Remove the session for `id`, returning it if present.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Remove the session for `id` if `pred` holds for it.
    pub fn remove_if(
        &self,
        id: &str,
        pred: impl FnOnce(&Session) -> bool,
    ) -> Option<Arc<Session>> {
        self.sessions
            .remove_if(id, |_, session| pred(session))
            .map(|(_, session)| session)
    }

    /// Snapshot of all current session ids.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session's backend and empty the table.
    ///
    /// Used on shutdown so no backend socket or subprocess outlives the
    /// listener.
    pub async fn close_all(&self) {
        for id in self.ids() {
            if let Some(session) = self.remove(&id) {
                session.close().await;
            }
        }
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let table = SessionTable::new();
        let (client, _server) = tcp_pair().await;

        table.insert_or_adopt("abc", BackendConn::Tcp(client)).await;

        assert!(table.get("abc").is_some());
        assert!(table.get("xyz").is_none());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_race_closes_loser() {
        let table = SessionTable::new();
        let (winner, _winner_peer) = tcp_pair().await;
        let (loser, mut loser_peer) = tcp_pair().await;

        let first = table.insert_or_adopt("abc", BackendConn::Tcp(winner)).await;
        let second = table.insert_or_adopt("abc", BackendConn::Tcp(loser)).await;

        // Both callers end up on the same record, and only one remains.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);

        // The losing dial was shut down.
        let mut buf = [0u8; 8];
        let n = loser_peer.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let table = SessionTable::new();
        let (client, _server) = tcp_pair().await;

        table.insert_or_adopt("abc", BackendConn::Tcp(client)).await;
        assert!(table.remove("abc").is_some());
        assert!(table.remove("abc").is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_remove_if_respects_predicate() {
        let table = SessionTable::new();
        let (client, _server) = tcp_pair().await;

        table.insert_or_adopt("abc", BackendConn::Tcp(client)).await;

        assert!(table.remove_if("abc", |_| false).is_none());
        assert_eq!(table.len(), 1);

        assert!(table.remove_if("abc", |_| true).is_some());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_empties_table() {
        let table = SessionTable::new();
        let (a, mut a_peer) = tcp_pair().await;
        let (b, mut b_peer) = tcp_pair().await;

        table.insert_or_adopt("a", BackendConn::Tcp(a)).await;
        table.insert_or_adopt("b", BackendConn::Tcp(b)).await;

        table.close_all().await;

        assert!(table.is_empty());
        let mut buf = [0u8; 8];
        assert_eq!(a_peer.read(&mut buf).await.unwrap(), 0);
        assert_eq!(b_peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ids_snapshot() {
        let table = SessionTable::new();
        let (a, _a_peer) = tcp_pair().await;
        let (b, _b_peer) = tcp_pair().await;

        table.insert_or_adopt("a", BackendConn::Tcp(a)).await;
        table.insert_or_adopt("b", BackendConn::Tcp(b)).await;

        let mut ids = table.ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
