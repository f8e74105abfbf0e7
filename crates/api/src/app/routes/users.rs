use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, put},
};

use simplerp_auth::{AuthContext, NewUser, PasswordChange, UserChanges};
use simplerp_core::{PageDefaults, UserId};

use crate::app::dto::{self, ApiJson, PageQuery};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{perms, require};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(deactivate_user))
        .route("/:id/password", put(change_password))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::USERS_VIEW)?;
    let page = query.to_request(PageDefaults::NEWEST_FIRST)?;
    Ok(errors::paged(services.users.list(&page).await?))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::USERS_VIEW)?;
    let id: UserId = dto::parse_id(&id)?;
    Ok(errors::ok(services.users.get(id).await?))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<NewUser>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::USERS_CREATE)?;
    let user = services.users.create(body).await?;
    Ok(errors::created(user, "user created"))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UserChanges>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::USERS_EDIT)?;
    let id: UserId = dto::parse_id(&id)?;
    let user = services.users.update(id, body).await?;
    Ok(errors::ok_with(user, "user updated"))
}

/// PUT /api/users/:id/password - own account, or any account with `users.edit`
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PasswordChange>,
) -> ApiResult<impl IntoResponse> {
    let id: UserId = dto::parse_id(&id)?;
    if id != ctx.user_id {
        require(&ctx, perms::USERS_EDIT)?;
    }
    services.users.change_password(id, body).await?;
    Ok(errors::done("password changed"))
}

/// DELETE /api/users/:id - deactivates; the account row is kept
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require(&ctx, perms::USERS_DELETE)?;
    let id: UserId = dto::parse_id(&id)?;
    let user = services.users.deactivate(id).await?;
    Ok(errors::ok_with(user, "user deactivated"))
}
