use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
};

use simplerp_auth::{AuthContext, NewPermission, PermissionChanges};
use simplerp_core::{PageDefaults, PermissionId};

use crate::app::dto::{self, ApiJson, PermissionQuery};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{perms, require};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route("/by-module", get(permissions_by_module))
        .route("/modules", get(list_modules))
        .route(
            "/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
}

/// GET /api/permissions - paginated list with name/module/role filters
pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PermissionQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_VIEW)?;
    let filter = query.to_filter()?;
    let page = query.page.to_request(PageDefaults::NEWEST_FIRST)?;
    let result = services.permissions.list(&filter, &page).await?;
    Ok(errors::paged(result))
}

/// GET /api/permissions/by-module
pub async fn permissions_by_module(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_VIEW)?;
    Ok(errors::ok(services.permissions.group_by_module().await?))
}

/// GET /api/permissions/modules
pub async fn list_modules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_VIEW)?;
    Ok(errors::ok(services.permissions.modules().await?))
}

pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_VIEW)?;
    let id: PermissionId = dto::parse_id(&id)?;
    Ok(errors::ok(services.permissions.get(id).await?))
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<NewPermission>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_CREATE)?;
    let created = services.permissions.create(body).await?;
    Ok(errors::created(created, "permission created"))
}

pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PermissionChanges>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_EDIT)?;
    let id: PermissionId = dto::parse_id(&id)?;
    let updated = services.permissions.update(id, body).await?;
    Ok(errors::ok(updated))
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::PERMISSIONS_DELETE)?;
    let id: PermissionId = dto::parse_id(&id)?;
    services.permissions.delete(id).await?;
    Ok(errors::done("permission deleted"))
}
