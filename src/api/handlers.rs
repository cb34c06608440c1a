//! The tunnel request handler.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::{BackendConn, BackendTarget};
use crate::config::TunnelOptions;
use crate::session::{derive_session_id, short_id, SessionTable, CDN_CLIENT_IP_HEADER};

/// Read buffer size for one backend drain iteration.
const READ_BUF_SIZE: usize = 8192;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<SessionTable>,
    pub target: BackendTarget,
    pub options: TunnelOptions,
}

impl AppState {
    pub fn new(target: BackendTarget, options: TunnelOptions) -> Self {
        Self {
            table: Arc::new(SessionTable::new()),
            target,
            options,
        }
    }
}

/// Handle one tunnel request.
///
/// Derives the session id from headers, finds or dials the backend, then
/// performs one half-duplex operation under the session lock: POST writes
/// the request body to the backend, everything else drains the backend
/// into a hex-encoded response body.
pub async fn tunnel(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let cdn_client_ip = parts
        .headers
        .get(CDN_CLIENT_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        client = cdn_client_ip.unwrap_or("-"),
        "request"
    );

    // Requests that did not come through the CDN are rejected unless the
    // operator explicitly allowed direct access.
    if cdn_client_ip.is_none() && !state.options.allow_direct {
        return error_response(StatusCode::FORBIDDEN, "Direct access not allowed");
    }

    let Some(session_id) = derive_session_id(&parts.headers) else {
        debug!("missing session ID");
        return error_response(StatusCode::BAD_REQUEST, "Missing session ID");
    };

    let session = match state.table.get(&session_id) {
        Some(session) => session,
        None => {
            let conn = match state.target.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(session = short_id(&session_id), "backend unavailable: {}", e);
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
            };
            state.table.insert_or_adopt(&session_id, conn).await
        }
    };

    let mut sess = session.lock().await;
    sess.touch();

    if parts.method == Method::POST {
        let data = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(data) => data,
            Err(e) => {
                debug!("error reading request body: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };
        // A zero-length body is a legal no-op.
        if !data.is_empty() {
            debug!(
                session = short_id(&session_id),
                bytes = data.len(),
                "POST: writing to backend"
            );
            if let Err(e) = sess.conn.write_all(&data).await {
                debug!("error writing to backend: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
        return decorated(Bytes::new());
    }

    match drain(&mut sess.conn, state.options.read_deadline).await {
        Ok(data) if data.is_empty() => {
            debug!(session = short_id(&session_id), "GET: no data to send");
            decorated(Bytes::new())
        }
        Ok(data) => {
            debug!(
                session = short_id(&session_id),
                bytes = data.len(),
                "GET: sending backend data"
            );
            decorated(Bytes::from(hex::encode(&data)))
        }
        Err(e) => {
            debug!("error reading from backend: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Drain the bytes the backend has currently produced.
///
/// Each read is armed with a fresh `deadline` so a fast producer can fill
/// several buffers in one call while a silent backend stalls the caller
/// for at most one deadline. The loop ends on a deadline with no new
/// bytes, EOF, or a short read; neither deadline nor EOF is an error.
async fn drain(conn: &mut BackendConn, deadline: Duration) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut data = Vec::new();

    loop {
        let n = match timeout(deadline, conn.read(&mut buf)).await {
            Err(_) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e),
        };
        data.extend_from_slice(&buf[..n]);
        if n < buf.len() {
            // Short read: nothing more immediately available.
            break;
        }
    }

    Ok(data)
}

/// A 200 response carrying the fixed header set.
///
/// The header values mimic a commodity Apache/PHP stack and are part of
/// the wire contract; intermediaries cache nothing and sniff nothing.
fn decorated(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static("Apache/2.4.41 (Ubuntu)"));
    headers.insert("x-powered-by", HeaderValue::from_static("PHP/7.4.33"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_drain_returns_available_bytes() {
        let (client, mut peer) = tcp_pair().await;
        let mut conn = BackendConn::Tcp(client);

        peer.write_all(b"abc").await.unwrap();
        peer.flush().await.unwrap();

        let data = drain(&mut conn, Duration::from_millis(50)).await.unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test]
    async fn test_drain_empty_on_silent_backend() {
        let (client, _peer) = tcp_pair().await;
        let mut conn = BackendConn::Tcp(client);

        let start = std::time::Instant::now();
        let data = drain(&mut conn, Duration::from_millis(50)).await.unwrap();
        assert!(data.is_empty());
        // One deadline, not a hang.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_drain_collects_multiple_buffers() {
        let (client, mut peer) = tcp_pair().await;
        let mut conn = BackendConn::Tcp(client);

        let payload = vec![0x5a_u8; READ_BUF_SIZE * 2];
        peer.write_all(&payload).await.unwrap();
        peer.flush().await.unwrap();
        // Let the kernel make both buffers' worth available.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let data = drain(&mut conn, Duration::from_millis(50)).await.unwrap();
        assert_eq!(data.len(), payload.len());
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn test_drain_stops_at_eof() {
        let (client, peer) = tcp_pair().await;
        let mut conn = BackendConn::Tcp(client);
        drop(peer);

        let data = drain(&mut conn, Duration::from_millis(50)).await.unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_decorated_headers() {
        let response = decorated(Bytes::new());
        let headers = response.headers();

        assert_eq!(headers[header::SERVER], "Apache/2.4.41 (Ubuntu)");
        assert_eq!(headers["x-powered-by"], "PHP/7.4.33");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[header::X_XSS_PROTECTION], "1; mode=block");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
