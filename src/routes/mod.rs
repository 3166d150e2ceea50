pub mod accounts;
pub mod auth;
pub mod history;
pub mod transfers;

use axum::{middleware, routing::get, Router};
use mongodb::bson::oid::ObjectId;
use tower_http::cors::CorsLayer;

use crate::error::ServiceError;
use crate::middlewares::require_bearer;
use crate::AppState;

/// A malformed id cannot address anything, so it reads as not-found.
pub(crate) fn parse_account_id(raw: &str) -> Result<ObjectId, ServiceError> {
    ObjectId::parse_str(raw).map_err(|_| ServiceError::AccountNotFound)
}

pub(crate) fn parse_entry_id(raw: &str) -> Result<ObjectId, ServiceError> {
    ObjectId::parse_str(raw).map_err(|_| ServiceError::EntryNotFound)
}

async fn liveness() -> &'static str {
    "mfs app is running"
}

pub fn app(state: AppState) -> Router {
    let admin = history::admin_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        require_bearer,
    ));
    Router::new()
        .route("/", get(liveness))
        .merge(auth::auth_routes())
        .merge(accounts::account_routes())
        .merge(transfers::transfer_routes())
        .merge(history::history_routes())
        .merge(admin)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_read_as_not_found() {
        assert!(matches!(
            parse_account_id("zzz").unwrap_err(),
            ServiceError::AccountNotFound
        ));
        assert!(matches!(
            parse_entry_id("123").unwrap_err(),
            ServiceError::EntryNotFound
        ));
        assert!(parse_account_id("65f0a1b2c3d4e5f6a7b8c9d0").is_ok());
    }
}
