use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, put},
};

use simplerp_auth::{AuthContext, NewRole, RoleChanges};
use simplerp_core::{PageDefaults, RoleId};

use crate::app::dto::{self, ApiJson, PageQuery, ReplacePermissionsRequest};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{perms, require};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/:id/permissions", put(replace_role_permissions))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_VIEW)?;
    let page = query.to_request(PageDefaults::BY_ID)?;
    Ok(errors::paged(services.roles.list(&page).await?))
}

/// GET /api/roles/:id - the role with its resolved permission set
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_VIEW)?;
    let id: RoleId = dto::parse_id(&id)?;
    Ok(errors::ok(services.roles.get(id).await?))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<NewRole>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_CREATE)?;
    let created = services.roles.create(body).await?;
    Ok(errors::created(created, "role created"))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RoleChanges>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_EDIT)?;
    let id: RoleId = dto::parse_id(&id)?;
    Ok(errors::ok(services.roles.update(id, body).await?))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_DELETE)?;
    let id: RoleId = dto::parse_id(&id)?;
    services.roles.delete(id).await?;
    Ok(errors::done("role deleted"))
}

/// PUT /api/roles/:id/permissions - replace the role's permission set
pub async fn replace_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ReplacePermissionsRequest>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::ROLES_EDIT)?;
    let id: RoleId = dto::parse_id(&id)?;
    let ids = body.ids()?;
    let role = services.roles.replace_permissions(id, ids).await?;
    Ok(errors::ok_with(role, "role permissions updated"))
}
