//! Mobile financial services backend: accounts, sessions, and an atomic
//! ledger over MongoDB, exposed as a JSON API.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod middlewares;
pub mod models;
pub mod query;
pub mod routes;
pub mod store;

use std::sync::Arc;

use auth::TokenService;
use ledger::Ledger;
use query::TransactionQuery;
use store::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub ledger: Ledger,
    pub queries: TransactionQuery,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, tokens: TokenService) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            queries: TransactionQuery::new(store.clone()),
            store,
            tokens,
        }
    }
}
