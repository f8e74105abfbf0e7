//! Login, refresh, logout and the caller's own profile.
//!
//! Tokens travel as `access_token` / `refresh_token` HTTP-only cookies and are
//! also returned in the body for clients that prefer `Authorization: Bearer`.

use std::sync::Arc;

use axum::{body::Bytes, extract::Extension, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use simplerp_auth::{AuthContext, TokenPair};
use simplerp_core::DomainError;

use crate::app::dto::{ApiJson, LoginRequest, RefreshRequest};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::middleware::{ACCESS_COOKIE, REFRESH_COOKIE};

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = services.auth.login(&body.username, &body.password).await?;
    let jar = with_session(jar, &session.tokens, services.secure_cookies());
    Ok((jar, errors::ok_with(session, "login successful")))
}

/// POST /api/auth/refresh - the refresh cookie, or `{ "refresh_token": ... }`
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let token = match jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) {
        Some(t) if !t.is_empty() => t,
        _ => refresh_token_from_body(&body)
            .ok_or_else(|| DomainError::unauthorized("refresh token required"))?,
    };

    let session = services.auth.refresh(&token).await?;
    let jar = with_session(jar, &session.tokens, services.secure_cookies());
    Ok((jar, errors::ok_with(session, "session refreshed")))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(expired_cookie(ACCESS_COOKIE)).add(expired_cookie(REFRESH_COOKIE));
    (jar, errors::done("logged out"))
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    Ok(errors::ok(services.auth.profile(&ctx).await?))
}

fn refresh_token_from_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()?
        .refresh_token
        .filter(|t| !t.trim().is_empty())
}

fn with_session(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, &tokens.access_token, secure))
        .add(session_cookie(REFRESH_COOKIE, &tokens.refresh_token, secure))
}

fn session_cookie(name: &'static str, value: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// An empty, already-expired cookie. Sent whether or not the request had one.
fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).http_only(true).path("/").build();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(ACCESS_COOKIE, "abc", true);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn body_fallback_ignores_garbage() {
        assert_eq!(refresh_token_from_body(b""), None);
        assert_eq!(refresh_token_from_body(b"not json"), None);
        assert_eq!(refresh_token_from_body(br#"{"refresh_token":"  "}"#), None);
        assert_eq!(
            refresh_token_from_body(br#"{"refresh_token":"r1"}"#).as_deref(),
            Some("r1")
        );
    }
}
