use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod users;

/// Routes that need no token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
}

/// Routes behind the auth middleware.
pub fn router() -> Router {
    Router::new()
        .route("/api/auth/me", get(auth::me))
        .nest("/api/permissions", permissions::router())
        .nest("/api/roles", roles::router())
        .nest("/api/users", users::router())
}
