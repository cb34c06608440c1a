//! Session management module.
//!
//! A session is a logical bidirectional byte stream multiplexed onto many
//! short HTTP request/response pairs, keyed by an opaque identifier
//! derived from request headers. This module provides the identifier
//! derivation, the per-session record, the concurrent table they live in,
//! and the reaper that evicts idle entries.

mod id;
mod reaper;
mod record;
mod table;

pub use id::{derive_session_id, short_id, CDN_CLIENT_IP_HEADER, CDN_RAY_HEADER, EPHEMERAL_HEADER};
pub use reaper::{sweep, Reaper};
pub use record::{Session, SessionState};
pub use table::SessionTable;
