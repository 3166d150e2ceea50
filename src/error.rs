use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::models::MoneyError;
use crate::store::StoreError;

/// Failure taxonomy for the whole service. Every variant has a stable
/// machine-readable kind and an HTTP status; handlers return these directly.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid counterparty: {0}")]
    InvalidCounterparty(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("duplicate identity: {0} already registered")]
    DuplicateIdentity(String),
    #[error("transaction entry not found")]
    EntryNotFound,
    #[error("transaction entry is not pending")]
    EntryNotPending,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("store unavailable")]
    StoreUnavailable(String),
    #[error("credential hashing failed")]
    Hashing(String),
    #[error("internal error")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidCredential => "invalid_credential",
            ServiceError::AccountNotFound => "account_not_found",
            ServiceError::InvalidCounterparty(_) => "invalid_counterparty",
            ServiceError::InsufficientFunds => "insufficient_funds",
            ServiceError::InvalidAmount(_) => "invalid_amount",
            ServiceError::DuplicateIdentity(_) => "duplicate_identity",
            ServiceError::EntryNotFound => "entry_not_found",
            ServiceError::EntryNotPending => "entry_not_pending",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::TokenInvalid => "token_invalid",
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::Hashing(_) => "hashing_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidCredential
            | ServiceError::TokenExpired
            | ServiceError::TokenInvalid => StatusCode::UNAUTHORIZED,
            ServiceError::AccountNotFound | ServiceError::EntryNotFound => StatusCode::NOT_FOUND,
            ServiceError::InvalidCounterparty(_)
            | ServiceError::InvalidAmount(_)
            | ServiceError::InsufficientFunds => StatusCode::BAD_REQUEST,
            ServiceError::DuplicateIdentity(_) | ServiceError::EntryNotPending => {
                StatusCode::CONFLICT
            }
            ServiceError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Hashing(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Detail kept out of responses but worth a log line.
    fn internal_detail(&self) -> Option<&str> {
        match self {
            ServiceError::StoreUnavailable(detail)
            | ServiceError::Hashing(detail)
            | ServiceError::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                kind = self.kind(),
                detail = self.internal_detail().unwrap_or_default(),
                "request failed"
            );
        } else {
            tracing::debug!(kind = self.kind(), "request rejected");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => ServiceError::DuplicateIdentity(field),
            StoreError::AccountNotFound => ServiceError::AccountNotFound,
            StoreError::EntryNotFound => ServiceError::EntryNotFound,
            StoreError::EntryNotPending => ServiceError::EntryNotPending,
            StoreError::InsufficientFunds => ServiceError::InsufficientFunds,
            StoreError::Corrupt(detail) => ServiceError::Internal(detail),
            StoreError::Unavailable(detail) => ServiceError::StoreUnavailable(detail),
        }
    }
}

impl From<MoneyError> for ServiceError {
    fn from(err: MoneyError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}
