use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{ADMIN_ACCESS, ROLES_CREATE, ROLES_DELETE, ROLES_READ, ROLES_UPDATE, USERS_READ, USERS_UPDATE};
use crate::authz::{require_all_permissions, CurrentPrincipal, Principal};
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::rbac::{
    ActionList, Permission, PermissionCreateRequest, PermissionFilter, PermissionUpdateRequest, ResourceList,
    RoleCreateRequest, RoleDetail, RoleFilter, RolePermission, RolePermissionSet, RoleUpdateRequest,
    SetRolePermissionsRequest, SetUserRolesRequest, UserRole, UserRoleSet, UserRolesResponse,
};
use crate::store::{membership, permissions, principals, roles};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).patch(update_permission).delete(delete_permission),
        )
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id", get(get_role).patch(update_role).delete(delete_role))
        .route("/roles/:id/permissions", put(set_role_permissions))
        .route(
            "/roles/:id/permissions/:permission_id",
            post(add_role_permission).delete(remove_role_permission),
        )
        .route("/users/:id/roles", get(get_user_roles).put(set_user_roles))
        .route("/users/:id/roles/:role_id", post(add_user_role).delete(remove_user_role))
        .route("/resources", get(list_resources))
        .route("/actions", get(list_actions))
}

/// Every admin route needs the admin gate plus its own permission.
async fn authorize(state: &AppState, principal: &Principal, permission: &str) -> AppResult<()> {
    require_all_permissions(state.policy.as_ref(), principal, &[ADMIN_ACCESS, permission]).await
}

async fn user_roles_response(state: &AppState, user_id: Uuid) -> AppResult<UserRolesResponse> {
    let user = principals::get(&state.pool, user_id).await?;
    let roles = membership::roles_of(&state.pool, user_id).await?;
    Ok(UserRolesResponse { user_id, email: user.email.clone(), full_name: user.full_name(), roles })
}

// -----------------------------------------------------------------------------
// Permissions
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/admin/rbac/permissions",
    tag = "RBAC",
    params(PermissionFilter),
    responses((status = 200, description = "List permissions", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(filter): Query<PermissionFilter>,
) -> AppResult<Json<Vec<Permission>>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(permissions::list(&state.pool, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/admin/rbac/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 400, description = "Name does not match resource:action"),
        (status = 409, description = "Name or resource/action pair already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    authorize(&state, &principal, ROLES_CREATE).await?;

    let permission = permissions::create(&state.pool, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(principal.user_id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    get,
    path = "/admin/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission detail", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Permission>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(permissions::get(&state.pool, id).await?))
}

#[utoipa::path(
    patch,
    path = "/admin/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    request_body = PermissionUpdateRequest,
    responses((status = 200, description = "Permission updated", body = Permission)),
    security(("bearerAuth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<PermissionUpdateRequest>,
) -> AppResult<Json<Permission>> {
    authorize(&state, &principal, ROLES_UPDATE).await?;

    let (before, permission) = permissions::update(&state.pool, id, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(principal.user_id),
        &permission,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

#[utoipa::path(
    delete,
    path = "/admin/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    responses(
        (status = 204, description = "Permission deleted and detached from every role"),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&state, &principal, ROLES_DELETE).await?;

    let permission = permissions::delete(&state.pool, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(principal.user_id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Roles
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/admin/rbac/roles",
    tag = "RBAC",
    params(RoleFilter),
    responses((status = 200, description = "List roles, highest priority first", body = [RoleDetail])),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(filter): Query<RoleFilter>,
) -> AppResult<Json<Vec<RoleDetail>>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(roles::list(&state.pool, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/admin/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = RoleDetail),
        (status = 404, description = "Unknown permission id"),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<RoleDetail>)> {
    authorize(&state, &principal, ROLES_CREATE).await?;

    let detail = roles::create(&state.pool, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(principal.user_id),
        &detail.role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    get,
    path = "/admin/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role with permissions and member count", body = RoleDetail),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RoleDetail>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(roles::load_role_with_permissions(&state.pool, id).await?))
}

#[utoipa::path(
    patch,
    path = "/admin/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleDetail),
        (status = 400, description = "Malformed body or unknown field"),
        (status = 403, description = "System role definition is read-only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    payload: Result<Json<RoleUpdateRequest>, JsonRejection>,
) -> AppResult<Json<RoleDetail>> {
    authorize(&state, &principal, ROLES_UPDATE).await?;
    let Json(payload) = payload?;

    let (before, detail) = roles::update(&state.pool, id, payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(principal.user_id),
        &detail.role,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(detail))
}

#[utoipa::path(
    delete,
    path = "/admin/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "System roles cannot be deleted")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&state, &principal, ROLES_DELETE).await?;

    let role = roles::delete(&state.pool, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(principal.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/admin/rbac/roles/{id}/permissions",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = SetRolePermissionsRequest,
    responses((status = 200, description = "Permission set replaced", body = RoleDetail)),
    security(("bearerAuth" = []))
)]
pub async fn set_role_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRolePermissionsRequest>,
) -> AppResult<Json<RoleDetail>> {
    authorize(&state, &principal, ROLES_UPDATE).await?;

    let detail = roles::set_permissions(&state.pool, id, &payload.permission_ids).await?;
    let written = RolePermissionSet {
        role_id: id,
        permission_ids: detail.permissions.iter().map(|p| p.id).collect(),
    };

    log_activity_with_context(
        &state.event_bus,
        "replaced",
        Some(principal.user_id),
        &written,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(detail))
}

#[utoipa::path(
    post,
    path = "/admin/rbac/roles/{id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "Role id"),
        ("permission_id" = Uuid, Path, description = "Permission id")
    ),
    responses((status = 200, description = "Permission granted to role", body = RoleDetail)),
    security(("bearerAuth" = []))
)]
pub async fn add_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RoleDetail>> {
    authorize(&state, &principal, ROLES_UPDATE).await?;

    let detail = roles::add_permission(&state.pool, role_id, permission_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(principal.user_id),
        &RolePermission { role_id, permission_id },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(detail))
}

#[utoipa::path(
    delete,
    path = "/admin/rbac/roles/{id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "Role id"),
        ("permission_id" = Uuid, Path, description = "Permission id")
    ),
    responses((status = 200, description = "Permission revoked from role", body = RoleDetail)),
    security(("bearerAuth" = []))
)]
pub async fn remove_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RoleDetail>> {
    authorize(&state, &principal, ROLES_UPDATE).await?;

    let detail = roles::remove_permission(&state.pool, role_id, permission_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(principal.user_id),
        &RolePermission { role_id, permission_id },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(detail))
}

// -----------------------------------------------------------------------------
// User role assignments
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/admin/rbac/users/{id}/roles",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Roles held by the user", body = UserRolesResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserRolesResponse>> {
    authorize(&state, &principal, USERS_READ).await?;
    Ok(Json(user_roles_response(&state, id).await?))
}

#[utoipa::path(
    put,
    path = "/admin/rbac/users/{id}/roles",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = SetUserRolesRequest,
    responses(
        (status = 200, description = "Role set replaced", body = UserRolesResponse),
        (status = 403, description = "Change would leave no active administrator"),
        (status = 404, description = "Unknown user or role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_user_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUserRolesRequest>,
) -> AppResult<Json<UserRolesResponse>> {
    authorize(&state, &principal, USERS_UPDATE).await?;

    let role_ids = membership::set_roles(&state.pool, id, &payload.role_ids, Some(principal.user_id)).await?;

    log_activity_with_context(
        &state.event_bus,
        "replaced",
        Some(principal.user_id),
        &UserRoleSet { user_id: id, role_ids },
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user_roles_response(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/admin/rbac/users/{id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("role_id" = Uuid, Path, description = "Role id")
    ),
    responses((status = 201, description = "Role granted", body = UserRole)),
    security(("bearerAuth" = []))
)]
pub async fn add_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<(StatusCode, Json<UserRole>)> {
    authorize(&state, &principal, USERS_UPDATE).await?;

    let assignment = membership::add_role(&state.pool, user_id, role_id, Some(principal.user_id)).await?;

    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(principal.user_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    delete,
    path = "/admin/rbac/users/{id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("role_id" = Uuid, Path, description = "Role id")
    ),
    responses(
        (status = 204, description = "Role revoked, or not held"),
        (status = 403, description = "Change would leave no active administrator")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_user_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    authorize(&state, &principal, USERS_UPDATE).await?;

    let removed = membership::remove_role(&state.pool, user_id, role_id).await?;
    if removed {
        let revoked = UserRole {
            user_id,
            role_id,
            assigned_by: Some(principal.user_id),
            assigned_at: utc_now(),
        };
        log_activity_with_context(
            &state.event_bus,
            "revoked",
            Some(principal.user_id),
            &revoked,
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Catalog listings
// -----------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/admin/rbac/resources",
    tag = "RBAC",
    responses((status = 200, description = "Distinct permission resources", body = ResourceList)),
    security(("bearerAuth" = []))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<ResourceList>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(ResourceList { resources: permissions::list_resources(&state.pool).await? }))
}

#[utoipa::path(
    get,
    path = "/admin/rbac/actions",
    tag = "RBAC",
    responses((status = 200, description = "Distinct permission actions", body = ActionList)),
    security(("bearerAuth" = []))
)]
pub async fn list_actions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<ActionList>> {
    authorize(&state, &principal, ROLES_READ).await?;
    Ok(Json(ActionList { actions: permissions::list_actions(&state.pool).await? }))
}
