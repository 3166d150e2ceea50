//! MongoDB-backed store. Multi-leg commits run inside a client session
//! transaction; every debit leg carries a `$gte` balance guard so a
//! concurrent drain aborts the transaction instead of overdrawing. Requires
//! a replica set (or sharded cluster) for transactions, as mongod setups for
//! this service usually are.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rust_decimal::Decimal;

use super::{BalanceLeg, LedgerStore, StoreError};
use crate::models::{money, Account, AccountStatus, EntryStatus, Role, TransactionEntry};

const ACCOUNTS: &str = "accounts";
const TRANSACTIONS: &str = "transactions";

pub struct MongoStore {
    client: Client,
    accounts: Collection<Account>,
    entries: Collection<TransactionEntry>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            accounts: db.collection(ACCOUNTS),
            entries: db.collection(TRANSACTIONS),
            client,
        }
    }

    /// Unique indexes close the registration race the pre-check leaves open;
    /// the compound indexes back the history queries.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = IndexOptions::builder().unique(true).build();
        self.accounts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
                None,
            )
            .await
            .map_err(driver_error)?;
        self.accounts
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "mobile": 1 })
                    .options(unique)
                    .build(),
                None,
            )
            .await
            .map_err(driver_error)?;
        self.entries
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sender_mobile": 1, "created_at": -1 })
                    .build(),
                None,
            )
            .await
            .map_err(driver_error)?;
        self.entries
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "receiver_mobile": 1, "created_at": -1 })
                    .build(),
                None,
            )
            .await
            .map_err(driver_error)?;
        Ok(())
    }

    /// Applies one leg inside the session. Zero matched rows means the guard
    /// or the id failed; a session-consistent re-read tells which.
    async fn apply_leg(
        &self,
        session: &mut ClientSession,
        leg: &BalanceLeg,
    ) -> Result<(), StoreError> {
        let delta =
            money::to_decimal128(leg.delta).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let filter = balance_guard_filter(leg.account_id, leg.delta)?;
        let update = doc! {
            "$inc": { "balance": delta },
            "$set": { "updated_at": DateTime::now() },
        };
        let result = self
            .accounts
            .update_one_with_session(filter, update, None, session)
            .await
            .map_err(driver_error)?;
        if result.matched_count == 0 {
            let exists = self
                .accounts
                .find_one_with_session(doc! { "_id": leg.account_id }, None, session)
                .await
                .map_err(driver_error)?;
            return Err(if exists.is_some() {
                StoreError::InsufficientFunds
            } else {
                StoreError::AccountNotFound
            });
        }
        Ok(())
    }

    async fn abort(&self, session: &mut ClientSession) {
        if let Err(err) = session.abort_transaction().await {
            tracing::warn!(error = %err, "transaction abort failed");
        }
    }
}

/// Debits only match while the balance covers them. Credits match on id alone.
fn balance_guard_filter(account_id: ObjectId, delta: Decimal) -> Result<Document, StoreError> {
    if delta < Decimal::ZERO {
        let debit =
            money::to_decimal128(-delta).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(doc! { "_id": account_id, "balance": { "$gte": debit } })
    } else {
        Ok(doc! { "_id": account_id })
    }
}

fn duplicate_field(err: &mongodb::error::Error) -> Option<&'static str> {
    let (code, message) = match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(we)) => (we.code, we.message.as_str()),
        ErrorKind::Command(ce) => (ce.code, ce.message.as_str()),
        _ => return None,
    };
    if code != 11000 {
        return None;
    }
    if message.contains("mobile") {
        Some("mobile number")
    } else if message.contains("email") {
        Some("email")
    } else {
        Some("identity")
    }
}

fn driver_error(err: mongodb::error::Error) -> StoreError {
    if let Some(field) = duplicate_field(&err) {
        return StoreError::Duplicate(field.into());
    }
    StoreError::Unavailable(err.to_string())
}

/// Escapes a user-supplied fragment for use inside `$regex`.
fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if ".^$*+?()[]{}|\\".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl LedgerStore for MongoStore {
    async fn insert_account(&self, mut account: Account) -> Result<Account, StoreError> {
        // Pre-check names the clashing field; the unique index has the final say.
        let clash = self
            .accounts
            .find_one(
                doc! { "$or": [ { "email": &account.email }, { "mobile": &account.mobile } ] },
                None,
            )
            .await
            .map_err(driver_error)?;
        if let Some(existing) = clash {
            let field = if existing.email == account.email {
                "email"
            } else {
                "mobile number"
            };
            return Err(StoreError::Duplicate(field.into()));
        }
        let result = self
            .accounts
            .insert_one(&account, None)
            .await
            .map_err(driver_error)?;
        account.id = result.inserted_id.as_object_id();
        Ok(account)
    }

    async fn find_account_by_id(&self, id: ObjectId) -> Result<Option<Account>, StoreError> {
        self.accounts
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(driver_error)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        self.accounts
            .find_one(
                doc! { "$or": [ { "email": identifier }, { "mobile": identifier } ] },
                None,
            )
            .await
            .map_err(driver_error)
    }

    async fn find_by_mobile_and_role(
        &self,
        mobile: &str,
        role: Role,
    ) -> Result<Option<Account>, StoreError> {
        self.accounts
            .find_one(doc! { "mobile": mobile, "role": role.as_str() }, None)
            .await
            .map_err(driver_error)
    }

    async fn apply_balance_delta(
        &self,
        id: ObjectId,
        delta: Decimal,
    ) -> Result<Account, StoreError> {
        let delta128 =
            money::to_decimal128(delta).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let filter = balance_guard_filter(id, delta)?;
        let update = doc! {
            "$inc": { "balance": delta128 },
            "$set": { "updated_at": DateTime::now() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .accounts
            .find_one_and_update(filter, update, options)
            .await
            .map_err(driver_error)?;
        match updated {
            Some(account) => Ok(account),
            None => {
                let exists = self.find_account_by_id(id).await?;
                Err(if exists.is_some() {
                    StoreError::InsufficientFunds
                } else {
                    StoreError::AccountNotFound
                })
            }
        }
    }

    async fn set_status(
        &self,
        id: ObjectId,
        status: AccountStatus,
        activation_bonus: Option<Decimal>,
    ) -> Result<Account, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        // Bonus rides on a status CAS matching pending, so a repeated
        // activation cannot credit it twice.
        if let Some(bonus) = activation_bonus {
            let bonus128 =
                money::to_decimal128(bonus).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let updated = self
                .accounts
                .find_one_and_update(
                    doc! { "_id": id, "status": AccountStatus::Pending.as_str() },
                    doc! {
                        "$set": { "status": status.as_str(), "updated_at": DateTime::now() },
                        "$inc": { "balance": bonus128 },
                    },
                    options.clone(),
                )
                .await
                .map_err(driver_error)?;
            if let Some(account) = updated {
                return Ok(account);
            }
        }
        let updated = self
            .accounts
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str(), "updated_at": DateTime::now() } },
                options,
            )
            .await
            .map_err(driver_error)?;
        updated.ok_or(StoreError::AccountNotFound)
    }

    async fn list_by_roles(
        &self,
        roles: &[Role],
        name_filter: Option<&str>,
    ) -> Result<Vec<Account>, StoreError> {
        let roles: Vec<&str> = roles.iter().map(Role::as_str).collect();
        let mut filter = doc! { "role": { "$in": roles } };
        if let Some(name) = name_filter {
            filter.insert(
                "name",
                doc! { "$regex": escape_regex(name), "$options": "i" },
            );
        }
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let cursor = self
            .accounts
            .find(filter, options)
            .await
            .map_err(driver_error)?;
        cursor.try_collect().await.map_err(driver_error)
    }

    async fn insert_entry(
        &self,
        mut entry: TransactionEntry,
    ) -> Result<TransactionEntry, StoreError> {
        let result = self
            .entries
            .insert_one(&entry, None)
            .await
            .map_err(driver_error)?;
        entry.id = result.inserted_id.as_object_id();
        Ok(entry)
    }

    async fn find_entry(&self, id: ObjectId) -> Result<Option<TransactionEntry>, StoreError> {
        self.entries
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(driver_error)
    }

    async fn commit_transfer(
        &self,
        legs: &[BalanceLeg],
        mut entry: TransactionEntry,
    ) -> Result<TransactionEntry, StoreError> {
        let mut session = self.client.start_session(None).await.map_err(driver_error)?;
        session
            .start_transaction(None)
            .await
            .map_err(driver_error)?;
        for leg in legs {
            if let Err(err) = self.apply_leg(&mut session, leg).await {
                self.abort(&mut session).await;
                return Err(err);
            }
        }
        match self
            .entries
            .insert_one_with_session(&entry, None, &mut session)
            .await
        {
            Ok(result) => entry.id = result.inserted_id.as_object_id(),
            Err(err) => {
                self.abort(&mut session).await;
                return Err(driver_error(err));
            }
        }
        session.commit_transaction().await.map_err(driver_error)?;
        Ok(entry)
    }

    async fn approve_entry(
        &self,
        id: ObjectId,
        legs: &[BalanceLeg],
    ) -> Result<TransactionEntry, StoreError> {
        let mut session = self.client.start_session(None).await.map_err(driver_error)?;
        session
            .start_transaction(None)
            .await
            .map_err(driver_error)?;
        // The status CAS makes a replayed approval fail instead of paying out
        // twice.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let flipped = match self
            .entries
            .find_one_and_update_with_session(
                doc! { "_id": id, "status": EntryStatus::Pending.as_str() },
                doc! { "$set": { "status": EntryStatus::Success.as_str() } },
                options,
                &mut session,
            )
            .await
        {
            Ok(flipped) => flipped,
            Err(err) => {
                self.abort(&mut session).await;
                return Err(driver_error(err));
            }
        };
        let Some(entry) = flipped else {
            self.abort(&mut session).await;
            let exists = self.find_entry(id).await?;
            return Err(if exists.is_some() {
                StoreError::EntryNotPending
            } else {
                StoreError::EntryNotFound
            });
        };
        for leg in legs {
            if let Err(err) = self.apply_leg(&mut session, leg).await {
                self.abort(&mut session).await;
                return Err(err);
            }
        }
        session.commit_transaction().await.map_err(driver_error)?;
        Ok(entry)
    }

    async fn reject_entry(&self, id: ObjectId) -> Result<TransactionEntry, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let rejected = self
            .entries
            .find_one_and_update(
                doc! { "_id": id, "status": EntryStatus::Pending.as_str() },
                doc! { "$set": { "status": EntryStatus::Rejected.as_str() } },
                options,
            )
            .await
            .map_err(driver_error)?;
        match rejected {
            Some(entry) => Ok(entry),
            None => {
                let exists = self.find_entry(id).await?;
                Err(if exists.is_some() {
                    StoreError::EntryNotPending
                } else {
                    StoreError::EntryNotFound
                })
            }
        }
    }

    async fn entries_for_mobile(
        &self,
        mobile: &str,
        limit: i64,
    ) -> Result<Vec<TransactionEntry>, StoreError> {
        let filter = doc! {
            "$or": [ { "sender_mobile": mobile }, { "receiver_mobile": mobile } ],
        };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();
        let cursor = self
            .entries
            .find(filter, options)
            .await
            .map_err(driver_error)?;
        cursor.try_collect().await.map_err(driver_error)
    }

    async fn entries_by_sender(
        &self,
        mobile: &str,
        statuses: &[EntryStatus],
    ) -> Result<Vec<TransactionEntry>, StoreError> {
        let statuses: Vec<&str> = statuses.iter().map(EntryStatus::as_str).collect();
        let filter = doc! { "sender_mobile": mobile, "status": { "$in": statuses } };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .entries
            .find(filter, options)
            .await
            .map_err(driver_error)?;
        cursor.try_collect().await.map_err(driver_error)
    }

    async fn all_entries(&self) -> Result<Vec<TransactionEntry>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self
            .entries
            .find(doc! {}, options)
            .await
            .map_err(driver_error)?;
        cursor.try_collect().await.map_err(driver_error)
    }
}
