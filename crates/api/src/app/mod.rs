//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the application services
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs, query parsing and the JSON extractor
//! - `errors.rs`: response envelope and error → status mapping

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: services::AppServices) -> Router {
    let auth_state = middleware::AuthState {
        issuer: services.issuer.clone(),
    };

    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            simplerp_observability::request_span(req.method(), req.uri().path())
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(trace)
                .layer(Extension(Arc::new(services))),
        )
}
