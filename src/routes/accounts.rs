use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch},
    Router,
};
use serde::Deserialize;

use super::parse_account_id;
use crate::error::ServiceError;
use crate::ledger;
use crate::middlewares::AuthClaims;
use crate::models::{AccountStatus, AccountView, Role};
use crate::AppState;

#[derive(Deserialize)]
struct ListQuery {
    name: Option<String>,
}

/// Account lookup by email or mobile. Bearer-only: balances are not public.
async fn get_account(
    State(state): State<AppState>,
    _claims: AuthClaims,
    Path(identifier): Path<String>,
) -> Result<Json<AccountView>, ServiceError> {
    let account = state
        .store
        .find_by_identifier(&identifier)
        .await?
        .ok_or(ServiceError::AccountNotFound)?;
    Ok(Json(AccountView::from(&account)))
}

/// Users and agents, optionally filtered by name. System accounts stay out
/// because the filter is on role.
async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AccountView>>, ServiceError> {
    let accounts = state
        .store
        .list_by_roles(&[Role::User, Role::Agent], query.name.as_deref())
        .await?;
    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

/// Admin activation. The first one credits the welcome bonus; repeats are
/// plain status writes.
async fn activate_account(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<AccountView>, ServiceError> {
    let id = parse_account_id(&identifier)?;
    let account = state
        .store
        .set_status(id, AccountStatus::Active, Some(ledger::activation_bonus()))
        .await?;
    tracing::info!(mobile = %account.mobile, "account activated");
    Ok(Json(AccountView::from(&account)))
}

async fn block_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountView>, ServiceError> {
    let id = parse_account_id(&id)?;
    let account = state
        .store
        .set_status(id, AccountStatus::Blocked, None)
        .await?;
    tracing::info!(mobile = %account.mobile, "account blocked");
    Ok(Json(AccountView::from(&account)))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_accounts))
        .route(
            "/user/:identifier",
            get(get_account).patch(activate_account),
        )
        .route("/block-user/:id", patch(block_account))
}
