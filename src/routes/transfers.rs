use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::parse_entry_id;
use crate::error::ServiceError;
use crate::models::EntryView;
use crate::AppState;

// Amounts cross the wire as strings; the rust_decimal serde feature does the
// parsing.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMoneyRequest {
    mobile: String,
    amount: Decimal,
    pin: String,
    user_email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashOutRequest {
    mobile: String,
    amount: Decimal,
    pin: String,
    user_email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashInRequest {
    mobile: String,
    amount: Decimal,
    user_mobile: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashInApproval {
    user_mobile: String,
    receiver_mobile: String,
    amount: Decimal,
}

async fn send_money(
    State(state): State<AppState>,
    Json(req): Json<SendMoneyRequest>,
) -> Result<Json<EntryView>, ServiceError> {
    let entry = state
        .ledger
        .send_money(&req.user_email, &req.mobile, req.amount, &req.pin)
        .await?;
    Ok(Json(EntryView::from(&entry)))
}

async fn cash_out(
    State(state): State<AppState>,
    Json(req): Json<CashOutRequest>,
) -> Result<Json<EntryView>, ServiceError> {
    let entry = state
        .ledger
        .cash_out(&req.user_email, &req.mobile, req.amount, &req.pin)
        .await?;
    Ok(Json(EntryView::from(&entry)))
}

/// `mobile` is the agent being asked; `userMobile` is the requesting user.
async fn request_cash_in(
    State(state): State<AppState>,
    Json(req): Json<CashInRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let entry = state
        .ledger
        .request_cash_in(&req.user_mobile, &req.mobile, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(EntryView::from(&entry))))
}

/// `receiverMobile` keeps its historical meaning: the agent the request was
/// addressed to.
async fn approve_cash_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CashInApproval>,
) -> Result<Json<EntryView>, ServiceError> {
    let id = parse_entry_id(&id)?;
    let entry = state
        .ledger
        .approve_cash_in(id, &req.user_mobile, &req.receiver_mobile, req.amount)
        .await?;
    Ok(Json(EntryView::from(&entry)))
}

async fn reject_cash_in(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntryView>, ServiceError> {
    let id = parse_entry_id(&id)?;
    let entry = state.ledger.reject_cash_in(id).await?;
    Ok(Json(EntryView::from(&entry)))
}

pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/send-money", patch(send_money))
        .route("/cash-out", patch(cash_out))
        .route("/cashin-request", post(request_cash_in))
        .route("/cashin-approve/:id", patch(approve_cash_in))
        .route("/cashin-reject/:id", patch(reject_cash_in))
}
