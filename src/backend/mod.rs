//! Backend endpoints for tunnel sessions.
//!
//! A session's backend is either a TCP connection to the configured
//! destination (proxy mode) or the stdio of a spawned subprocess
//! (application mode). Both are driven through [`BackendConn`], which
//! exposes the same read/write/close surface regardless of what sits
//! behind it.

mod process;

pub use process::ProcessPipe;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TunnelError;
use crate::Result;

/// How new sessions obtain their backend endpoint.
///
/// Selected once at startup; the two modes are mutually exclusive.
#[derive(Debug, Clone)]
pub enum BackendTarget {
    /// Dial a TCP connection to `host:port` for each new session.
    Proxy { host: String, port: u16 },
    /// Spawn `command` (whitespace-tokenized) for each new session and
    /// bridge its stdio.
    App { command: String },
}

impl BackendTarget {
    /// Establish a fresh backend endpoint for a new session.
    ///
    /// Dial or spawn failures surface to the caller; no session state is
    /// created for a backend that never came up.
    pub async fn connect(&self) -> Result<BackendConn> {
        match self {
            Self::Proxy { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(TunnelError::Dial)?;
                // Small writes dominate tunnel traffic; don't let Nagle delay them.
                let _ = stream.set_nodelay(true);
                debug!(host = %host, port = port, "backend connected");
                Ok(BackendConn::Tcp(stream))
            }
            Self::App { command } => {
                let pipe = ProcessPipe::spawn(command)?;
                debug!(command = %command, "application launched");
                Ok(BackendConn::Process(pipe))
            }
        }
    }
}

/// An open bidirectional backend endpoint owned by one session record.
pub enum BackendConn {
    /// TCP connection to the proxy destination.
    Tcp(TcpStream),
    /// Spawned subprocess: stdin is the write end, merged stdout/stderr
    /// the read end.
    Process(ProcessPipe),
}

impl BackendConn {
    /// Write `data` verbatim to the backend.
    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(data).await,
            Self::Process(pipe) => pipe.write_all(data).await,
        }
    }

    /// Read whatever the backend has available into `buf`.
    ///
    /// Returns `Ok(0)` on EOF. Callers bound each call with their own
    /// deadline; this method itself blocks until bytes arrive.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf).await,
            Self::Process(pipe) => pipe.read(buf).await,
        }
    }

    /// Tear the backend down: half-close the socket or kill the subprocess.
    pub async fn close(&mut self) {
        match self {
            Self::Tcp(stream) => {
                let _ = stream.shutdown().await;
            }
            Self::Process(pipe) => pipe.close().await,
        }
    }
}

impl std::fmt::Debug for BackendConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("BackendConn::Tcp"),
            Self::Process(_) => f.write_str("BackendConn::Process"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_proxy_connect_and_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let target = BackendTarget::Proxy {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let mut conn = target.connect().await.unwrap();

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        conn.close().await;
    }

    #[tokio::test]
    async fn test_proxy_connect_refused() {
        // Port 1 on loopback is essentially never listening.
        let target = BackendTarget::Proxy {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        let result = target.connect().await;
        assert!(matches!(result, Err(TunnelError::Dial(_))));
    }

    #[tokio::test]
    async fn test_read_returns_zero_on_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let target = BackendTarget::Proxy {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let mut conn = target.connect().await.unwrap();

        let mut buf = [0u8; 16];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
