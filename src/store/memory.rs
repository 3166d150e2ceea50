//! In-process store with the same contract as the MongoDB store. Backs the
//! test suite and works for local development without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};
use rust_decimal::Decimal;

use super::{BalanceLeg, LedgerStore, StoreError};
use crate::models::{money, Account, AccountStatus, EntryStatus, Role, TransactionEntry};

#[derive(Default)]
struct Inner {
    accounts: HashMap<ObjectId, Account>,
    entries: Vec<TransactionEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: the next `commit_transfer` or `approve_entry` fails after
    /// validation and before any write, like a connection dropped mid-commit.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        Ok(())
    }
}

fn current_balance(account: &Account) -> Result<Decimal, StoreError> {
    account
        .balance()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn write_balance(account: &mut Account, next: Decimal) -> Result<(), StoreError> {
    account.balance = money::to_decimal128(next).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    account.updated_at = DateTime::now();
    Ok(())
}

/// Fold legs into one net delta per account, then check every resulting
/// balance. Nothing is written here.
fn validate_legs(
    inner: &Inner,
    legs: &[BalanceLeg],
) -> Result<Vec<(ObjectId, Decimal)>, StoreError> {
    let mut net: HashMap<ObjectId, Decimal> = HashMap::new();
    let mut order = Vec::new();
    for leg in legs {
        if !net.contains_key(&leg.account_id) {
            order.push(leg.account_id);
        }
        *net.entry(leg.account_id).or_insert(Decimal::ZERO) += leg.delta;
    }
    let mut planned = Vec::with_capacity(order.len());
    for id in order {
        let account = inner.accounts.get(&id).ok_or(StoreError::AccountNotFound)?;
        let next = current_balance(account)? + net[&id];
        if next < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds);
        }
        planned.push((id, next));
    }
    Ok(planned)
}

fn apply_planned(inner: &mut Inner, planned: &[(ObjectId, Decimal)]) -> Result<(), StoreError> {
    for (id, next) in planned {
        let account = inner
            .accounts
            .get_mut(id)
            .ok_or(StoreError::AccountNotFound)?;
        write_balance(account, *next)?;
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_account(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut inner = self.guard()?;
        if inner.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate("email".into()));
        }
        if inner.accounts.values().any(|a| a.mobile == account.mobile) {
            return Err(StoreError::Duplicate("mobile number".into()));
        }
        let id = ObjectId::new();
        account.id = Some(id);
        inner.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn find_account_by_id(&self, id: ObjectId) -> Result<Option<Account>, StoreError> {
        Ok(self.guard()?.accounts.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .guard()?
            .accounts
            .values()
            .find(|a| a.email == identifier || a.mobile == identifier)
            .cloned())
    }

    async fn find_by_mobile_and_role(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .guard()?
            .accounts
            .values()
            .find(|a| a.mobile == mobile && a.role == role)
            .cloned())
    }

    async fn apply_balance_delta(
        &self,
        id: ObjectId,
        delta: Decimal,
    ) -> Result<Account, StoreError> {
        let mut inner = self.guard()?;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound)?;
        let next = current_balance(account)? + delta;
        if next < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds);
        }
        write_balance(account, next)?;
        Ok(account.clone())
    }

    async fn set_status(
        &self,
        id: ObjectId,
        status: AccountStatus,
        activation_bonus: Option<Decimal>,
    ) -> Result<Account, StoreError> {
        let mut inner = self.guard()?;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound)?;
        // The bonus rides only on the first pending -> active transition.
        if account.status == AccountStatus::Pending {
            if let Some(bonus) = activation_bonus {
                let next = current_balance(account)? + bonus;
                write_balance(account, next)?;
            }
        }
        account.status = status;
        account.updated_at = DateTime::now();
        Ok(account.clone())
    }

    async fn list_by_roles(
        &self,
        roles: &[Role],
        name_filter: Option<&str>,
    ) -> Result<Vec<Account>, StoreError> {
        let inner = self.guard()?;
        let needle = name_filter.map(str::to_lowercase);
        let mut matched: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| roles.contains(&a.role))
            .filter(|a| match &needle {
                Some(needle) => a.name.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by_key(|a| a.created_at);
        Ok(matched)
    }

    async fn insert_entry(
        &self,
        mut entry: TransactionEntry,
    ) -> Result<TransactionEntry, StoreError> {
        let mut inner = self.guard()?;
        entry.id = Some(ObjectId::new());
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    async fn find_entry(&self, id: ObjectId) -> Result<Option<TransactionEntry>, StoreError> {
        Ok(self
            .guard()?
            .entries
            .iter()
            .find(|e| e.id == Some(id))
            .cloned())
    }

    async fn commit_transfer(
        &self,
        legs: &[BalanceLeg],
        mut entry: TransactionEntry,
    ) -> Result<TransactionEntry, StoreError> {
        let mut inner = self.guard()?;
        let planned = validate_legs(&inner, legs)?;
        self.take_injected_failure()?;
        apply_planned(&mut inner, &planned)?;
        entry.id = Some(ObjectId::new());
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    async fn approve_entry(
        &self,
        id: ObjectId,
        legs: &[BalanceLeg],
    ) -> Result<TransactionEntry, StoreError> {
        let mut inner = self.guard()?;
        let position = inner
            .entries
            .iter()
            .position(|e| e.id == Some(id))
            .ok_or(StoreError::EntryNotFound)?;
        if inner.entries[position].status != EntryStatus::Pending {
            return Err(StoreError::EntryNotPending);
        }
        let planned = validate_legs(&inner, legs)?;
        self.take_injected_failure()?;
        apply_planned(&mut inner, &planned)?;
        inner.entries[position].status = EntryStatus::Success;
        Ok(inner.entries[position].clone())
    }

    async fn reject_entry(&self, id: ObjectId) -> Result<TransactionEntry, StoreError> {
        let mut inner = self.guard()?;
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.id == Some(id))
            .ok_or(StoreError::EntryNotFound)?;
        if entry.status != EntryStatus::Pending {
            return Err(StoreError::EntryNotPending);
        }
        entry.status = EntryStatus::Rejected;
        Ok(entry.clone())
    }

    async fn entries_for_mobile(
        &self,
        mobile: &str,
        limit: i64,
    ) -> Result<Vec<TransactionEntry>, StoreError> {
        let take = limit.max(0) as usize;
        Ok(self
            .guard()?
            .entries
            .iter()
            .rev()
            .filter(|e| e.sender_mobile == mobile || e.receiver_mobile == mobile)
            .take(take)
            .cloned()
            .collect())
    }

    async fn entries_by_sender(
        &self,
        mobile: &str,
        statuses: &[EntryStatus],
    ) -> Result<Vec<TransactionEntry>, StoreError> {
        Ok(self
            .guard()?
            .entries
            .iter()
            .rev()
            .filter(|e| e.sender_mobile == mobile && statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<TransactionEntry>, StoreError> {
        Ok(self.guard()?.entries.iter().rev().cloned().collect())
    }
}
