use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, Principal};
use crate::core::state::AppState;

/// Any authenticated caller. Identity is carried entirely by the verified
/// token; there is no user table behind it.
pub(crate) struct CurrentPrincipal(pub(crate) Principal);

/// Teacher or admin.
pub(crate) struct CurrentAuthority(pub(crate) Principal);

pub(crate) struct CurrentAdmin(pub(crate) Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let principal = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentPrincipal(principal))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAuthority {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) = CurrentPrincipal::from_request_parts(parts, state).await?;

        if principal.is_authority() {
            Ok(CurrentAuthority(principal))
        } else {
            Err(ApiError::Forbidden("Teacher or admin access required".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) = CurrentPrincipal::from_request_parts(parts, state).await?;

        if principal.is_admin() {
            Ok(CurrentAdmin(principal))
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }
}
