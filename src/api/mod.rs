//! HTTP layer for cdn-tunnel.
//!
//! One handler serves every method on every path: the CDN in front of
//! this server forwards arbitrary web requests, and the tunnel protocol
//! keys purely off headers and method, never the path.
//!
//! ## Wire contract
//!
//! - `POST` with a session-id header: body bytes are written verbatim to
//!   the session's backend; response is 200 with an empty body.
//! - Any other method with a session-id header: currently-available
//!   backend bytes are drained and returned as a lowercase-hex body
//!   (possibly empty).
//! - Missing session id: 400. Missing CDN client-IP header without
//!   `allow_direct`: 403. Backend failures: 500 with the error text.

pub mod handlers;
pub mod router;

pub use handlers::{tunnel, AppState};
pub use router::{create_router, serve, ServerConfig, TlsConfig};
