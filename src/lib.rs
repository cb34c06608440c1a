//! # cdn-tunnel
//!
//! Server endpoint of a TCP-over-HTTP(S) tunnel fronted by a
//! general-purpose CDN.
//!
//! A client wraps TCP bytes in HTTPS requests addressed to a CDN-fronted
//! hostname; the CDN forwards those requests here. This server
//! reconstructs per-client byte streams and bridges them to either a
//! configured backend TCP endpoint (proxy mode) or a locally spawned
//! subprocess's stdio (application mode).
//!
//! ## Protocol
//!
//! Each session is keyed by an opaque identifier carried in request
//! headers and mapped to one live backend endpoint. Direction is split by
//! HTTP method: POST bodies carry raw client-to-backend bytes; every other
//! request drains backend-to-client bytes, returned as lowercase hex.
//! Idle sessions are evicted by a background reaper.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cdn_tunnel::backend::BackendTarget;
//! use cdn_tunnel::config::TunnelOptions;
//! use cdn_tunnel::{serve, AppState, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cdn_tunnel::Result<()> {
//!     let target = BackendTarget::Proxy {
//!         host: "127.0.0.1".to_string(),
//!         port: 22,
//!     };
//!     let options = TunnelOptions {
//!         allow_direct: false,
//!         read_deadline: Duration::from_millis(50),
//!         idle_timeout: Duration::from_secs(300),
//!         reap_interval: Duration::from_secs(60),
//!     };
//!     let state = AppState::new(target, options);
//!     let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 8080);
//!     serve(config, state).await
//! }
//! ```

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use api::{create_router, serve, AppState, ServerConfig, TlsConfig};
pub use backend::{BackendConn, BackendTarget};
pub use cli::{parse_args, print_help, print_version, Args};
pub use config::Config;
pub use error::{Result, TunnelError};
pub use session::{derive_session_id, Reaper, Session, SessionTable};
