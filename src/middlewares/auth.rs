use axum::body::Body;
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use mongodb::bson::oid::ObjectId;

use crate::error::ServiceError;
use crate::models::Role;
use crate::AppState;

/// Verified claims of the calling account.
#[derive(Debug, Clone, Copy)]
pub struct AuthClaims {
    pub account_id: ObjectId,
    pub role: Role,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn claims_from_headers(state: &AppState, headers: &HeaderMap) -> Result<AuthClaims, ServiceError> {
    let token = bearer_token(headers).ok_or(ServiceError::TokenInvalid)?;
    let claims = state.tokens.verify(token)?;
    Ok(AuthClaims {
        account_id: claims.account_id()?,
        role: claims.role,
    })
}

/// Rejects requests without a valid bearer token and attaches the verified
/// claims for handlers to extract.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServiceError> {
    let auth = claims_from_headers(&state, req.headers())?;
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

/// Uses the claims `require_bearer` attached when the route runs behind it,
/// and verifies the header itself otherwise.
#[async_trait]
impl FromRequestParts<AppState> for AuthClaims {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<AuthClaims>() {
            return Ok(*claims);
        }
        claims_from_headers(state, &parts.headers)
    }
}
