//! Subscriber setup: an `EnvFilter` layer over a JSON fmt layer.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// JSON logs filtered by `RUST_LOG` (default `info`).
///
/// Each event carries the span stack, so handler logs include the
/// `http_request` fields (`request_id`, `method`, `path`, `user_id`).
/// Calling this again after a subscriber is installed does nothing.
pub fn init() {
    let json = fmt::layer()
        .json()
        .with_timer(fmt::time::SystemTime)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(true);

    let _ = tracing_subscriber::registry().with(filter()).with(json).try_init();
}
