use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_pin, verify_pin};
use crate::error::ServiceError;
use crate::models::{Account, AccountView, Role};
use crate::AppState;

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    mobile: String,
    role: Role,
    pin: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    pin: String,
}

/// Account plus a fresh session token, returned by both register and login.
#[derive(Serialize)]
struct SessionBody {
    data: AccountView,
    token: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let pin_hash = hash_pin(&req.pin).await?;
    let account = Account::new(req.name, req.email, req.mobile, req.role, pin_hash);
    let account = state.store.insert_account(account).await?;
    let id = account
        .id
        .ok_or_else(|| ServiceError::Internal("inserted account has no id".into()))?;
    let token = state.tokens.issue(id, account.role)?;
    tracing::info!(mobile = %account.mobile, role = account.role.as_str(), "account registered");
    let body = SessionBody {
        data: AccountView::from(&account),
        token,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionBody>, ServiceError> {
    let account = state
        .store
        .find_by_identifier(&req.identifier)
        .await?
        .ok_or(ServiceError::AccountNotFound)?;
    if !verify_pin(&req.pin, &account.pin_hash).await? {
        return Err(ServiceError::InvalidCredential);
    }
    let id = account
        .id
        .ok_or_else(|| ServiceError::Internal("stored account has no id".into()))?;
    let token = state.tokens.issue(id, account.role)?;
    tracing::debug!(mobile = %account.mobile, "login succeeded");
    Ok(Json(SessionBody {
        data: AccountView::from(&account),
        token,
    }))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}
