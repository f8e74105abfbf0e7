//! Per-request spans for the HTTP layer.

use std::fmt::Display;

use tracing::{Span, field, info_span};
use uuid::Uuid;

/// Opens the `http_request` span every handler log line nests under.
///
/// `request_id` is a fresh UUIDv7; `user_id` stays empty until the auth
/// middleware records the caller.
pub fn request_span(method: &dyn Display, path: &str) -> Span {
    info_span!(
        "http_request",
        request_id = %Uuid::now_v7(),
        method = %method,
        path,
        user_id = field::Empty,
    )
}

/// Records the authenticated caller on the current request span.
pub fn record_user(user_id: &dyn Display) {
    Span::current().record("user_id", field::display(user_id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_built_without_a_subscriber() {
        let span = request_span(&"GET", "/api/roles");
        let _guard = span.enter();
        record_user(&"0192f0c4-0000-7000-8000-000000000000");
    }
}
