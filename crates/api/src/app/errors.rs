//! Response envelope and the mapping of domain errors to HTTP statuses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use simplerp_core::{DomainError, Page, PageMeta};

/// Every JSON body this API returns. Absent fields are omitted.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
            meta: None,
        }
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    pub fn page(page: Page<T>) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(page.items),
            error: None,
            meta: Some(page.meta),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::data(data))
}

pub fn ok_with<T: Serialize>(data: T, message: &str) -> Json<Envelope<T>> {
    Json(Envelope::data(data).with_message(message))
}

pub fn created<T: Serialize>(data: T, message: &str) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, Json(Envelope::data(data).with_message(message)))
}

pub fn paged<T: Serialize>(page: Page<T>) -> Json<Envelope<Vec<T>>> {
    Json(Envelope::page(page))
}

pub fn done(message: &str) -> Json<Envelope<()>> {
    Json(Envelope::message(message))
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A [`DomainError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(value)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::Unauthorized(_) => "unauthorized",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, data) = match self.0 {
            DomainError::Validation(fields) => (
                "validation failed".to_string(),
                serde_json::to_value(fields.to_map()).ok(),
            ),
            DomainError::NotFound(what) => (format!("{what} not found"), None),
            DomainError::Conflict(msg) | DomainError::Unauthorized(msg) => (msg, None),
            DomainError::Forbidden(permission) => {
                warn!(permission = %permission, "request forbidden");
                (format!("missing permission '{permission}'"), None)
            }
            DomainError::Internal(detail) => {
                error!(error = %detail, "request failed");
                ("internal server error".to_string(), None)
            }
        };

        let body = Envelope {
            success: false,
            message: Some(message),
            data,
            error: Some(code),
            meta: None,
        };
        (status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (DomainError::invalid_field("name", "name is required"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("role"), StatusCode::NOT_FOUND),
            (DomainError::conflict("role in use"), StatusCode::CONFLICT),
            (DomainError::unauthorized("nope"), StatusCode::UNAUTHORIZED),
            (DomainError::forbidden("roles.view"), StatusCode::FORBIDDEN),
            (DomainError::internal("db down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn empty_fields_are_omitted() {
        let body = serde_json::to_value(Envelope::message("ok")).unwrap();
        assert_eq!(body, serde_json::json!({ "success": true, "message": "ok" }));
    }
}
