//! Storage seam for accounts and the transaction log.
//!
//! Both implementations honor the same atomicity contract: `commit_transfer`
//! and `approve_entry` apply every balance leg and the entry write as one
//! unit. A failed commit leaves no partial state behind.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Account, AccountStatus, EntryStatus, Role, TransactionEntry};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already registered")]
    Duplicate(String),
    #[error("account not found")]
    AccountNotFound,
    #[error("transaction not found")]
    EntryNotFound,
    #[error("transaction is not pending")]
    EntryNotPending,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One signed balance movement against a single account. Debits are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceLeg {
    pub account_id: ObjectId,
    pub delta: Decimal,
}

impl BalanceLeg {
    pub fn credit(account_id: ObjectId, amount: Decimal) -> Self {
        Self {
            account_id,
            delta: amount,
        }
    }

    pub fn debit(account_id: ObjectId, amount: Decimal) -> Self {
        Self {
            account_id,
            delta: -amount,
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new account. Fails `Duplicate` when the email or mobile is
    /// already registered.
    async fn insert_account(&self, account: Account) -> Result<Account, StoreError>;

    async fn find_account_by_id(&self, id: ObjectId) -> Result<Option<Account>, StoreError>;

    /// Look up by email or mobile, whichever matches.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_mobile_and_role(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<Option<Account>, StoreError>;

    /// Atomically increment a balance. A debit that would take the balance
    /// negative fails `InsufficientFunds` without applying anything.
    async fn apply_balance_delta(
        &self,
        id: ObjectId,
        delta: Decimal,
    ) -> Result<Account, StoreError>;

    /// Atomically change an account's status. The activation bonus, when
    /// given, is credited only if the account is still pending, so repeated
    /// activations cannot credit it twice.
    async fn set_status(
        &self,
        id: ObjectId,
        status: AccountStatus,
        activation_bonus: Option<Decimal>,
    ) -> Result<Account, StoreError>;

    /// Accounts in any of `roles`, optionally filtered by a case-insensitive
    /// substring match on the name.
    async fn list_by_roles(
        &self,
        roles: &[Role],
        name_filter: Option<&str>,
    ) -> Result<Vec<Account>, StoreError>;

    async fn insert_entry(&self, entry: TransactionEntry)
        -> Result<TransactionEntry, StoreError>;

    async fn find_entry(&self, id: ObjectId) -> Result<Option<TransactionEntry>, StoreError>;

    /// Apply all legs and append the entry atomically. Any failing leg
    /// (missing account, insufficient balance) aborts the whole commit.
    async fn commit_transfer(
        &self,
        legs: &[BalanceLeg],
        entry: TransactionEntry,
    ) -> Result<TransactionEntry, StoreError>;

    /// Apply all legs and flip a pending entry to success atomically. Fails
    /// `EntryNotPending` when the entry was already settled, so a replayed
    /// approval cannot move money twice.
    async fn approve_entry(
        &self,
        id: ObjectId,
        legs: &[BalanceLeg],
    ) -> Result<TransactionEntry, StoreError>;

    /// Flip a pending entry to rejected. No balance changes.
    async fn reject_entry(&self, id: ObjectId) -> Result<TransactionEntry, StoreError>;

    /// Entries where the mobile appears as sender or receiver, newest first.
    async fn entries_for_mobile(
        &self,
        mobile: &str,
        limit: i64,
    ) -> Result<Vec<TransactionEntry>, StoreError>;

    /// Entries sent by `mobile` whose status is in `statuses`, newest first.
    async fn entries_by_sender(
        &self,
        mobile: &str,
        statuses: &[EntryStatus],
    ) -> Result<Vec<TransactionEntry>, StoreError>;

    /// The whole log, newest first.
    async fn all_entries(&self) -> Result<Vec<TransactionEntry>, StoreError>;
}
