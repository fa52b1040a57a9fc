use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{ADMIN_ACCESS, USERS_UPDATE};
use crate::authz::{require_all_permissions, CurrentPrincipal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::user::{AdminUserUpdateRequest, User};
use crate::store::principals;

#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = AdminUserUpdateRequest,
    responses(
        (status = 200, description = "User flags updated", body = User),
        (status = 403, description = "Self edit, missing permission, or last administrator"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUserUpdateRequest>,
) -> AppResult<Json<User>> {
    require_all_permissions(state.policy.as_ref(), &principal, &[ADMIN_ACCESS, USERS_UPDATE]).await?;

    if id == principal.user_id {
        return Err(AppError::forbidden("administrators cannot change their own account flags"));
    }

    let (before, user) = principals::set_flags(&state.pool, id, payload.is_active, payload.is_superadmin).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(principal.user_id),
        &user,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}
