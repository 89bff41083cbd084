//! Bearer-token extractors.

use crate::db::User;
use crate::error::AppError;
use crate::server::AppState;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|s| s.to_string())
}

/// An authenticated caller and the token they presented.
pub struct CurrentUser {
    /// The caller.
    pub user: User,
    /// Session token.
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthenticated("Unauthenticated".to_string()))?;

        let user = state
            .auth
            .validate_token(&token)?
            .ok_or_else(|| AppError::Unauthenticated("Invalid or expired token".to_string()))?;

        Ok(Self { user, token })
    }
}

/// The caller if a valid token was sent. A bad token reads as anonymous.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_token(&parts.headers) else {
            return Ok(Self(None));
        };

        Ok(Self(state.auth.validate_token(&token)?))
    }
}

/// An authenticated administrator.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, .. } = CurrentUser::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            tracing::debug!(user_id = %user.id, "Admin route refused");
            return Err(AppError::Forbidden(
                "Unauthorized. Admin access required.".to_string(),
            ));
        }

        Ok(Self(user))
    }
}
