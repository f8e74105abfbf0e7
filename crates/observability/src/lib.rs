//! Process-wide tracing setup shared by the binaries, plus the request span
//! the HTTP layer opens for every call.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Request spans.
pub mod http;

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use http::{record_user, request_span};
