use std::str::FromStr;

use axum::extract::{FromRequest, Request};
use axum::{Json, async_trait};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use simplerp_auth::PermissionFilter;
use simplerp_core::{DomainError, DomainResult, PageDefaults, PageRequest, PermissionId};

use crate::app::errors::ApiError;

// -------------------------
// Extractors
// -------------------------

/// `Json<T>` whose rejections come back inside the error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError(DomainError::invalid_field("body", e.body_text())))?;
        Ok(ApiJson(value))
    }
}

/// Parses a path segment into a typed id; failures are field errors on `id`.
pub fn parse_id<I>(raw: &str) -> DomainResult<I>
where
    I: FromStr<Err = DomainError>,
{
    raw.parse()
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl PageQuery {
    pub fn to_request(&self, defaults: PageDefaults) -> DomainResult<PageRequest> {
        PageRequest::parse(
            defaults,
            parse_number("page", self.page.as_deref())?,
            parse_number("limit", self.limit.as_deref())?,
            self.sort.as_deref(),
            self.order.as_deref(),
        )
    }
}

// Query values arrive as strings; `flatten` cannot coerce them itself.
fn parse_number(field: &'static str, raw: Option<&str>) -> DomainResult<Option<u32>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| DomainError::invalid_field(field, format!("{field} must be a positive integer"))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub name: Option<String>,
    pub module: Option<String>,
    pub role_id: Option<String>,
    pub linked: Option<String>,
}

impl PermissionQuery {
    pub fn to_filter(&self) -> DomainResult<PermissionFilter> {
        let role_id = match self.role_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| DomainError::invalid_field("role_id", "role_id must be a uuid"))?,
            ),
        };
        let linked = match self.linked.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(_) => {
                return Err(DomainError::invalid_field(
                    "linked",
                    "linked must be 'true' or 'false'",
                ));
            }
        };

        Ok(PermissionFilter {
            name: self.name.clone(),
            module: self.module.clone(),
            role_id,
            linked,
        })
    }
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplacePermissionsRequest {
    pub permission_ids: Vec<String>,
}

impl ReplacePermissionsRequest {
    pub fn ids(&self) -> DomainResult<Vec<PermissionId>> {
        self.permission_ids
            .iter()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    DomainError::invalid_field("permission_ids", format!("'{raw}' is not a valid id"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_query_parses_role_link() {
        let role = simplerp_core::RoleId::new();
        let q = PermissionQuery {
            role_id: Some(role.to_string()),
            linked: Some("false".into()),
            ..Default::default()
        };
        let filter = q.to_filter().unwrap();
        assert_eq!(filter.role_link(), Some((role, false)));
    }

    #[test]
    fn page_numbers_are_parsed_and_clamped() {
        let q = PageQuery {
            page: Some("2".into()),
            limit: Some("500".into()),
            ..Default::default()
        };
        let req = q.to_request(PageDefaults::NEWEST_FIRST).unwrap();
        assert_eq!((req.page, req.limit), (2, 100));

        let bad = PageQuery {
            page: Some("two".into()),
            ..Default::default()
        };
        assert!(bad.to_request(PageDefaults::NEWEST_FIRST).is_err());
    }

    #[test]
    fn bad_linked_flag_is_rejected() {
        let q = PermissionQuery {
            linked: Some("maybe".into()),
            ..Default::default()
        };
        assert!(matches!(q.to_filter(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn bad_permission_id_names_the_field() {
        let req = ReplacePermissionsRequest {
            permission_ids: vec!["nope".into()],
        };
        let DomainError::Validation(fields) = req.ids().unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(fields.to_map().contains_key("permission_ids"));
    }
}
