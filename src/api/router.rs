//! Router construction and HTTP/HTTPS serving.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{tunnel, AppState};
use crate::error::TunnelError;

/// Create the router with all routes configured.
///
/// The tunnel protocol is path-agnostic, so a single fallback handler
/// catches every method on every path.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(tunnel)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Validated at startup to be local.
    pub host: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// TLS material; present iff the origin scheme is https.
    pub tls: Option<TlsConfig>,
}

/// Certificate and key files for HTTPS serving.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            tls: None,
        }
    }

    pub fn with_tls(mut self, cert_file: PathBuf, key_file: PathBuf) -> Self {
        self.tls = Some(TlsConfig {
            cert_file,
            key_file,
        });
        self
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

/// Start the server and run until a shutdown signal arrives.
///
/// On ctrl-c or SIGTERM the listener stops accepting, in-flight requests
/// get a grace period, and every live session backend is closed before
/// this function returns.
pub async fn serve(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let table = Arc::clone(&state.table);
    let router = create_router(state);

    match &config.tls {
        Some(tls) => {
            // rustls defaults give TLS 1.2-1.3; axum-server advertises
            // ALPN h2 then http/1.1.
            let rustls = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                .await
                .map_err(TunnelError::Io)?;

            info!("serving HTTPS on {}", addr);
            let handle = axum_server::Handle::new();
            let watcher = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                watcher.graceful_shutdown(Some(Duration::from_secs(5)));
            });

            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .map_err(TunnelError::Io)?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(TunnelError::Io)?;

            info!("serving HTTP on {}", addr);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(TunnelError::Io)?;
        }
    }

    info!("closing {} live session(s)", table.len());
    table.close_all().await;
    Ok(())
}

/// Resolves when the process receives ctrl-c or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_plain() {
        let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 8080);
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:8080");
        assert_eq!(config.scheme(), "http");
    }

    #[test]
    fn test_server_config_tls() {
        let config = ServerConfig::new("0.0.0.0".parse().unwrap(), 443)
            .with_tls(PathBuf::from("cert.pem"), PathBuf::from("key.pem"));
        assert_eq!(config.scheme(), "https");
        assert!(config.tls.is_some());
    }
}
