use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::error::ServiceError;
use crate::middlewares::AuthClaims;
use crate::models::{EntryView, Role};
use crate::query::{DEFAULT_AGENT_HISTORY_LIMIT, DEFAULT_HISTORY_LIMIT};
use crate::AppState;

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct AgentHistoryQuery {
    mobile: String,
    limit: Option<i64>,
}

async fn user_history(
    State(state): State<AppState>,
    Path(mobile): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<EntryView>>, ServiceError> {
    let entries = state
        .queries
        .history_for(&mobile, query.limit, DEFAULT_HISTORY_LIMIT)
        .await?;
    Ok(Json(entries.iter().map(EntryView::from).collect()))
}

async fn agent_history(
    State(state): State<AppState>,
    Query(query): Query<AgentHistoryQuery>,
) -> Result<Json<Vec<EntryView>>, ServiceError> {
    let entries = state
        .queries
        .history_for(&query.mobile, query.limit, DEFAULT_AGENT_HISTORY_LIMIT)
        .await?;
    Ok(Json(entries.iter().map(EntryView::from).collect()))
}

/// Cash-in requests addressed to the agent, pending first-class; rejected
/// ones are filtered out by the query service.
async fn agent_requests(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<EntryView>>, ServiceError> {
    let entries = state.queries.pending_and_success_for(&email).await?;
    Ok(Json(entries.iter().map(EntryView::from).collect()))
}

/// The full log. Admin only; any other role gets the same 401 as a missing
/// credential.
async fn all_transactions(
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<Json<Vec<EntryView>>, ServiceError> {
    if claims.role != Role::Admin {
        return Err(ServiceError::InvalidCredential);
    }
    let entries = state.queries.all_transactions().await?;
    Ok(Json(entries.iter().map(EntryView::from).collect()))
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/transaction-request/:email", get(agent_requests))
        .route("/transaction-history/:mobile", get(user_history))
        .route("/trans-history-agent", get(agent_history))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/transactions", get(all_transactions))
}
