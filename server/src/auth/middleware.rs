//! Authentication middleware.
//!
//! A single shared secret: when `AUTH_SECRET` is configured, sync requests
//! must carry it as a Bearer token. Without it, requests are anonymous.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::AppState;

/// Caller admitted to the sync endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    /// Presented the configured secret
    Token,
    /// No secret is configured
    Anonymous,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret.as_deref() else {
            return Ok(AuthUser::Anonymous);
        };

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                if token.is_empty() {
                    return Err(AppError::Unauthorized("Empty bearer token"));
                }
                if !bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
                    return Err(AppError::Unauthorized("Invalid bearer token"));
                }
                Ok(AuthUser::Token)
            }
            Some(_) => Err(AppError::Unauthorized(
                "Invalid authorization header format",
            )),
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}
