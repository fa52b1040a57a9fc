use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::principal::Principal;
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::AuthUser;
use crate::store::principals;

/// The authenticated caller, reloaded from the database for this request.
///
/// Rejects with `Unauthorized` when the token's subject no longer exists and
/// with `Forbidden` when the account has been deactivated.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;

        let principal = principals::load_principal_with_roles(&state.pool, auth.user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

        if !principal.active {
            tracing::info!(user_id = %principal.user_id, "request from inactive account rejected");
            return Err(AppError::forbidden("inactive account"));
        }

        Ok(CurrentPrincipal(principal))
    }
}
