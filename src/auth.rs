//! Bearer-token shell for the HTTP surface.
//!
//! Who may create or mutate a vehicle's dispatch schedule (owner vs. grid
//! operator) is a policy decision owned by the integrating system; this
//! layer only gates the API behind the configured service token.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};

use crate::app::AppState;

#[derive(Debug, Clone)]
pub struct AuthBearer;

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthBearer {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if token != state.cfg.auth.token {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(Self)
    }
}
