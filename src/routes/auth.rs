use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app::AppState;
use crate::authz::CurrentPrincipal;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, MeResponse, MessageResponse, NewUser, RegisterRequest,
    ResetPasswordRequest, User,
};
use crate::notify::ResetNotice;
use crate::store::{principals, reset_tokens};
use crate::utils::{burn_verification, hash_password, utc_now, verify_password};

const FORGOT_PASSWORD_MESSAGE: &str = "If an account exists with this email, you will receive a password reset link.";
const INVALID_RESET_TOKEN: &str = "invalid or expired reset token";

fn validate_registration(payload: &RegisterRequest) -> AppResult<()> {
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("a valid email is required"));
    }
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(AppError::bad_request("first_name and last_name are required"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    validate_registration(&payload)?;

    let new_user = NewUser {
        email: payload.email.trim().to_string(),
        password_hash: hash_password(&payload.password)?,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        email_verified: false,
        is_superadmin: false,
    };

    let user = principals::create(&state.pool, new_user).await?;
    let token = state.config.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, token_type: "bearer", user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let Some(db_user) = principals::find_by_email(&state.pool, payload.email.trim()).await? else {
        burn_verification(&payload.password);
        return Err(AppError::unauthorized("invalid credentials"));
    };

    if !verify_password(&payload.password, &db_user.password_hash) {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    if !db_user.is_active {
        return Err(AppError::forbidden("inactive account"));
    }

    let token = state.config.jwt.encode(db_user.id)?;
    let user: User = db_user.into();

    log_activity_with_context(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(AuthResponse { token, token_type: "bearer", user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user with roles and effective permissions", body = MeResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account inactive")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> AppResult<Json<MeResponse>> {
    let user = principals::get(&state.pool, principal.user_id).await?;

    Ok(Json(MeResponse {
        user,
        roles: principal.role_names(),
        permissions: principal.effective_permissions().into_iter().collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    // Session tokens are stateless; the client discards its copy.
    Ok(Json(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong current password, or weak new password"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account inactive")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let db_user = principals::find_by_id(&state.pool, principal.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    if !verify_password(&payload.current_password, &db_user.password_hash) {
        tracing::info!(user_id = %db_user.id, "password change rejected");
        return Err(AppError::bad_request("invalid credentials"));
    }

    let password_hash = hash_password(&payload.new_password)?;
    let user = principals::change_password(&state.pool, db_user.id, &password_hash, utc_now()).await?;

    log_activity_with_context(
        &state.event_bus,
        "password_changed",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Same response whether or not the account exists", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user = principals::find_by_email(&state.pool, payload.email.trim()).await?;

    match user {
        Some(user) if user.is_active => {
            let reset = &state.config.reset;
            let issued = reset_tokens::issue(&state.pool, user.id, reset.ttl()?, utc_now()).await?;

            log_activity_with_context(
                &state.event_bus,
                "requested",
                None,
                &issued,
                None,
                Some(RequestContext::from_headers(&headers)),
            );

            let notice = ResetNotice::new(
                user.email.clone(),
                user.first_name.clone(),
                issued.token.clone(),
                reset.expire_minutes,
                &reset.app_url,
            );
            if let Err(err) = state.notifier.send_password_reset(notice).await {
                tracing::error!(user_id = %user.id, error = %err, "failed to deliver password reset notice");
            }
        }
        Some(user) => tracing::info!(user_id = %user.id, "password reset requested for inactive account"),
        None => tracing::debug!("password reset requested for unknown email"),
    }

    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset token, or weak password")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let consumed = reset_tokens::consume(&state.pool, &payload.token, &payload.new_password, utc_now())
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) | AppError::Expired(_) | AppError::AlreadyConsumed(_) => {
                tracing::info!(reason = err.kind(), "password reset rejected");
                AppError::bad_request(INVALID_RESET_TOKEN)
            }
            other => other,
        })?;

    log_activity_with_context(
        &state.event_bus,
        "consumed",
        Some(consumed.user_id),
        &consumed,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}
