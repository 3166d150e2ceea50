//! The ledger engine. Every balance mutation in the service goes through
//! here, and every successful transfer leaves exactly one log entry behind.

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use password_hash::rand_core::OsRng;
use password_hash::SaltString;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::auth;
use crate::error::ServiceError;
use crate::models::{Account, AccountStatus, EntryKind, EntryStatus, Role, TransactionEntry};
use crate::store::{BalanceLeg, LedgerStore, StoreError};

/// System account that collects send-money fees. Not listable, not
/// loginable (its PIN is random and discarded at creation).
pub const FEE_ACCOUNT_EMAIL: &str = "fees@mfs.local";
pub const FEE_ACCOUNT_MOBILE: &str = "0000000000";

/// Send-money is free up to 100 units, then a flat 5.
pub fn send_money_fee(amount: Decimal) -> Decimal {
    if amount > Decimal::ONE_HUNDRED {
        Decimal::from(5)
    } else {
        Decimal::ZERO
    }
}

/// Cash-out charges 1.5%, rounded to whole units, midpoint away from zero.
pub fn cash_out_fee(amount: Decimal) -> Decimal {
    let rate = Decimal::new(15, 3);
    (amount * rate).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// One-time credit on the first activation of an account.
pub fn activation_bonus() -> Decimal {
    Decimal::from(40)
}

fn account_id(account: &Account) -> Result<ObjectId, ServiceError> {
    account
        .id
        .ok_or_else(|| ServiceError::Internal("stored account has no id".into()))
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Creates the fee vault if it does not exist yet. Safe to race: a
    /// duplicate insert falls back to the account the other writer created.
    pub async fn ensure_fee_account(&self) -> Result<Account, ServiceError> {
        if let Some(existing) = self.store.find_by_identifier(FEE_ACCOUNT_EMAIL).await? {
            return Ok(existing);
        }
        let pin_hash = auth::hash_pin(SaltString::generate(&mut OsRng).as_str()).await?;
        let mut vault = Account::new(
            "Fee vault".into(),
            FEE_ACCOUNT_EMAIL.into(),
            FEE_ACCOUNT_MOBILE.into(),
            Role::Admin,
            pin_hash,
        );
        vault.status = AccountStatus::Active;
        match self.store.insert_account(vault).await {
            Ok(created) => {
                tracing::info!(email = FEE_ACCOUNT_EMAIL, "fee vault account provisioned");
                Ok(created)
            }
            Err(StoreError::Duplicate(_)) => self
                .store
                .find_by_identifier(FEE_ACCOUNT_EMAIL)
                .await?
                .ok_or_else(|| ServiceError::Internal("fee vault provisioning raced".into())),
            Err(err) => Err(err.into()),
        }
    }

    async fn fee_account(&self) -> Result<Account, ServiceError> {
        match self.store.find_by_identifier(FEE_ACCOUNT_EMAIL).await? {
            Some(account) => Ok(account),
            None => self.ensure_fee_account().await,
        }
    }

    /// User-to-user transfer. The receiver gets the amount net of the fee;
    /// the fee goes to the vault in the same commit.
    pub async fn send_money(
        &self,
        sender_email: &str,
        receiver_mobile: &str,
        amount: Decimal,
        pin: &str,
    ) -> Result<TransactionEntry, ServiceError> {
        let sender = self
            .store
            .find_by_identifier(sender_email)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        if !auth::verify_pin(pin, &sender.pin_hash).await? {
            return Err(ServiceError::InvalidCredential);
        }
        let receiver = self
            .store
            .find_by_mobile_and_role(receiver_mobile, Role::User)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidCounterparty("no user with that mobile number".into())
            })?;
        if receiver.id == sender.id {
            return Err(ServiceError::InvalidCounterparty(
                "cannot send money to yourself".into(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount("amount must be positive".into()));
        }
        let fee = send_money_fee(amount);
        let net = amount - fee;
        // Friendly pre-check; the store's conditional debit is the
        // authoritative guard under concurrency.
        if sender.balance()? < amount {
            return Err(ServiceError::InsufficientFunds);
        }
        let mut legs = vec![
            BalanceLeg::debit(account_id(&sender)?, amount),
            BalanceLeg::credit(account_id(&receiver)?, net),
        ];
        if fee > Decimal::ZERO {
            let vault = self.fee_account().await?;
            legs.push(BalanceLeg::credit(account_id(&vault)?, fee));
        }
        let entry = TransactionEntry::new(
            EntryKind::SendMoney,
            sender.mobile.clone(),
            receiver.mobile.clone(),
            net,
            fee,
            EntryStatus::Success,
        )?;
        let entry = self.store.commit_transfer(&legs, entry).await?;
        tracing::info!(
            sender = %sender.mobile,
            receiver = %receiver.mobile,
            amount = %amount,
            fee = %fee,
            "send money committed"
        );
        Ok(entry)
    }

    /// User withdraws through an agent. The agent is credited the amount
    /// plus the fee; the fee is the agent's income.
    pub async fn cash_out(
        &self,
        sender_email: &str,
        agent_mobile: &str,
        amount: Decimal,
        pin: &str,
    ) -> Result<TransactionEntry, ServiceError> {
        let sender = self
            .store
            .find_by_identifier(sender_email)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        if !auth::verify_pin(pin, &sender.pin_hash).await? {
            return Err(ServiceError::InvalidCredential);
        }
        let agent = self
            .store
            .find_by_mobile_and_role(agent_mobile, Role::Agent)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidCounterparty("no agent with that mobile number".into())
            })?;
        if agent.id == sender.id {
            return Err(ServiceError::InvalidCounterparty(
                "cannot cash out to yourself".into(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount("amount must be positive".into()));
        }
        let fee = cash_out_fee(amount);
        let total = amount + fee;
        if sender.balance()? < total {
            return Err(ServiceError::InsufficientFunds);
        }
        let legs = [
            BalanceLeg::debit(account_id(&sender)?, total),
            BalanceLeg::credit(account_id(&agent)?, total),
        ];
        let entry = TransactionEntry::new(
            EntryKind::CashOut,
            sender.mobile.clone(),
            agent.mobile.clone(),
            amount,
            fee,
            EntryStatus::Success,
        )?;
        let entry = self.store.commit_transfer(&legs, entry).await?;
        tracing::info!(
            sender = %sender.mobile,
            agent = %agent.mobile,
            amount = %amount,
            fee = %fee,
            "cash out committed"
        );
        Ok(entry)
    }

    /// User asks an agent for a deposit. Money moves only on approval.
    pub async fn request_cash_in(
        &self,
        user_mobile: &str,
        agent_mobile: &str,
        amount: Decimal,
    ) -> Result<TransactionEntry, ServiceError> {
        let agent = self
            .store
            .find_by_mobile_and_role(agent_mobile, Role::Agent)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidCounterparty("no agent with that mobile number".into())
            })?;
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount("amount must be positive".into()));
        }
        let user = self
            .store
            .find_by_mobile_and_role(user_mobile, Role::User)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        let entry = TransactionEntry::new(
            EntryKind::CashIn,
            agent.mobile.clone(),
            user.mobile.clone(),
            amount,
            Decimal::ZERO,
            EntryStatus::Pending,
        )?;
        let entry = self.store.insert_entry(entry).await?;
        tracing::info!(
            user = %user.mobile,
            agent = %agent.mobile,
            amount = %amount,
            "cash in requested"
        );
        Ok(entry)
    }

    /// Agent approves a pending cash-in. The stored entry is the source of
    /// truth; the request parameters only have to agree with it.
    pub async fn approve_cash_in(
        &self,
        entry_id: ObjectId,
        user_mobile: &str,
        agent_mobile: &str,
        amount: Decimal,
    ) -> Result<TransactionEntry, ServiceError> {
        let entry = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or(ServiceError::EntryNotFound)?;
        if entry.status != EntryStatus::Pending {
            return Err(ServiceError::EntryNotPending);
        }
        if entry.receiver_mobile != user_mobile || entry.sender_mobile != agent_mobile {
            return Err(ServiceError::InvalidCounterparty(
                "parties do not match the requested transaction".into(),
            ));
        }
        let stored_amount = entry.amount()?;
        if stored_amount != amount {
            return Err(ServiceError::InvalidAmount(
                "amount does not match the requested transaction".into(),
            ));
        }
        let user = self
            .store
            .find_by_mobile_and_role(&entry.receiver_mobile, Role::User)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        let agent = self
            .store
            .find_by_mobile_and_role(&entry.sender_mobile, Role::Agent)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidCounterparty("agent account no longer exists".into())
            })?;
        let legs = [
            BalanceLeg::debit(account_id(&agent)?, stored_amount),
            BalanceLeg::credit(account_id(&user)?, stored_amount),
        ];
        let entry = self.store.approve_entry(entry_id, &legs).await?;
        tracing::info!(
            id = %entry_id,
            user = %user.mobile,
            agent = %agent.mobile,
            amount = %stored_amount,
            "cash in approved"
        );
        Ok(entry)
    }

    /// Agent turns down a pending cash-in. No balances move.
    pub async fn reject_cash_in(&self, entry_id: ObjectId) -> Result<TransactionEntry, ServiceError> {
        let entry = self.store.reject_entry(entry_id).await?;
        tracing::info!(id = %entry_id, "cash in rejected");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    const TEST_PIN: &str = "13579";

    async fn harness() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone());
        (store, ledger)
    }

    async fn seeded(
        store: &MemoryStore,
        name: &str,
        mobile: &str,
        role: Role,
        balance: Decimal,
    ) -> Account {
        let pin_hash = auth::hash_pin(TEST_PIN).await.unwrap();
        let mut account = Account::new(
            name.into(),
            format!("{mobile}@example.com"),
            mobile.into(),
            role,
            pin_hash,
        );
        account.status = AccountStatus::Active;
        let account = store.insert_account(account).await.unwrap();
        if balance > Decimal::ZERO {
            return store
                .apply_balance_delta(account.id.unwrap(), balance)
                .await
                .unwrap();
        }
        account
    }

    async fn balance_of(store: &MemoryStore, id: ObjectId) -> Decimal {
        store
            .find_account_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .balance()
            .unwrap()
    }

    #[test]
    fn send_money_fee_kicks_in_above_the_threshold() {
        assert_eq!(send_money_fee(dec!(100)), dec!(0));
        assert_eq!(send_money_fee(dec!(100.01)), dec!(5));
        assert_eq!(send_money_fee(dec!(150)), dec!(5));
    }

    #[test]
    fn cash_out_fee_is_decimal_exact() {
        assert_eq!(cash_out_fee(dec!(1000)), dec!(15));
        assert_eq!(cash_out_fee(dec!(100)), dec!(2));
        assert_eq!(cash_out_fee(dec!(50)), dec!(1));
        assert_eq!(cash_out_fee(dec!(33)), dec!(0));
        // Same input, same fee, every time. No float drift.
        for _ in 0..10 {
            assert_eq!(cash_out_fee(dec!(100)), dec!(2));
        }
    }

    #[tokio::test]
    async fn send_money_over_threshold_routes_fee_to_the_vault() {
        let (store, ledger) = harness().await;
        let sender = seeded(&store, "Alice", "01700000001", Role::User, dec!(500)).await;
        let receiver = seeded(&store, "Bob", "01700000002", Role::User, dec!(0)).await;

        let entry = ledger
            .send_money(&sender.email, &receiver.mobile, dec!(150), TEST_PIN)
            .await
            .unwrap();
        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.amount().unwrap(), dec!(145));
        assert_eq!(entry.fee().unwrap(), dec!(5));

        assert_eq!(balance_of(&store, sender.id.unwrap()).await, dec!(350));
        assert_eq!(balance_of(&store, receiver.id.unwrap()).await, dec!(145));
        let vault = store
            .find_by_identifier(FEE_ACCOUNT_EMAIL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(vault.balance().unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn send_money_at_the_threshold_is_free() {
        let (store, ledger) = harness().await;
        let sender = seeded(&store, "Alice", "01700000001", Role::User, dec!(500)).await;
        let receiver = seeded(&store, "Bob", "01700000002", Role::User, dec!(0)).await;
        ledger.ensure_fee_account().await.unwrap();

        let entry = ledger
            .send_money(&sender.email, &receiver.mobile, dec!(100), TEST_PIN)
            .await
            .unwrap();
        assert_eq!(entry.amount().unwrap(), dec!(100));
        assert_eq!(entry.fee().unwrap(), dec!(0));

        assert_eq!(balance_of(&store, receiver.id.unwrap()).await, dec!(100));
        let vault = store
            .find_by_identifier(FEE_ACCOUNT_EMAIL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(vault.balance().unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn send_money_rejects_wrong_pin_without_moving_money() {
        let (store, ledger) = harness().await;
        let sender = seeded(&store, "Alice", "01700000001", Role::User, dec!(500)).await;
        let receiver = seeded(&store, "Bob", "01700000002", Role::User, dec!(0)).await;

        let err = ledger
            .send_money(&sender.email, &receiver.mobile, dec!(50), "00000")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredential));
        assert_eq!(balance_of(&store, sender.id.unwrap()).await, dec!(500));
        assert!(store.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_money_counterparty_must_be_a_user() {
        let (store, ledger) = harness().await;
        let sender = seeded(&store, "Alice", "01700000001", Role::User, dec!(500)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(0)).await;

        let err = ledger
            .send_money(&sender.email, &agent.mobile, dec!(50), TEST_PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCounterparty(_)));

        let err = ledger
            .send_money(&sender.email, &sender.mobile, dec!(50), TEST_PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCounterparty(_)));
    }

    #[tokio::test]
    async fn send_money_validates_the_amount() {
        let (store, ledger) = harness().await;
        let sender = seeded(&store, "Alice", "01700000001", Role::User, dec!(40)).await;
        let receiver = seeded(&store, "Bob", "01700000002", Role::User, dec!(0)).await;

        let err = ledger
            .send_money(&sender.email, &receiver.mobile, dec!(0), TEST_PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidAmount(_)));

        let err = ledger
            .send_money(&sender.email, &receiver.mobile, dec!(150), TEST_PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds));
        assert_eq!(balance_of(&store, sender.id.unwrap()).await, dec!(40));
    }

    #[tokio::test]
    async fn cash_out_moves_amount_plus_fee_to_the_agent() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(1015)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(0)).await;

        let entry = ledger
            .cash_out(&user.email, &agent.mobile, dec!(1000), TEST_PIN)
            .await
            .unwrap();
        assert_eq!(entry.amount().unwrap(), dec!(1000));
        assert_eq!(entry.fee().unwrap(), dec!(15));
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(0));
        assert_eq!(balance_of(&store, agent.id.unwrap()).await, dec!(1015));
    }

    #[tokio::test]
    async fn cash_out_needs_amount_plus_fee_available() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(1000)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(0)).await;

        let err = ledger
            .cash_out(&user.email, &agent.mobile, dec!(1000), TEST_PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds));
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(1000));
    }

    #[tokio::test]
    async fn cash_in_request_validates_parties_and_amount() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(0)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(0)).await;

        let err = ledger
            .request_cash_in(&user.mobile, "01999999999", dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCounterparty(_)));

        let err = ledger
            .request_cash_in(&user.mobile, &agent.mobile, dec!(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidAmount(_)));

        let err = ledger
            .request_cash_in("01999999999", &agent.mobile, dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountNotFound));

        assert!(store.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cash_in_settles_on_approval_and_only_once() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(0)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(200)).await;

        let entry = ledger
            .request_cash_in(&user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap();
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.sender_mobile, agent.mobile);
        assert_eq!(entry.receiver_mobile, user.mobile);
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(0));

        let id = entry.id.unwrap();
        let settled = ledger
            .approve_cash_in(id, &user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap();
        assert_eq!(settled.status, EntryStatus::Success);
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(50));
        assert_eq!(balance_of(&store, agent.id.unwrap()).await, dec!(150));

        let err = ledger
            .approve_cash_in(id, &user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EntryNotPending));
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(50));
    }

    #[tokio::test]
    async fn approval_params_must_match_the_stored_entry() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(0)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(200)).await;

        let entry = ledger
            .request_cash_in(&user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap();
        let id = entry.id.unwrap();

        let err = ledger
            .approve_cash_in(id, &user.mobile, &agent.mobile, dec!(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidAmount(_)));

        let err = ledger
            .approve_cash_in(id, "01999999999", &agent.mobile, dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCounterparty(_)));

        // Still pending, still payable.
        let stored = store.find_entry(id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Pending);
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(0));
    }

    #[tokio::test]
    async fn rejected_cash_in_moves_no_money_and_stays_rejected() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(0)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(200)).await;

        let entry = ledger
            .request_cash_in(&user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap();
        let id = entry.id.unwrap();

        let rejected = ledger.reject_cash_in(id).await.unwrap();
        assert_eq!(rejected.status, EntryStatus::Rejected);
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(0));
        assert_eq!(balance_of(&store, agent.id.unwrap()).await, dec!(200));

        let err = ledger
            .approve_cash_in(id, &user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EntryNotPending));
    }

    #[tokio::test]
    async fn approving_against_a_broke_agent_fails_cleanly() {
        let (store, ledger) = harness().await;
        let user = seeded(&store, "Alice", "01700000001", Role::User, dec!(0)).await;
        let agent = seeded(&store, "Agent", "01800000001", Role::Agent, dec!(10)).await;

        let entry = ledger
            .request_cash_in(&user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap();
        let id = entry.id.unwrap();

        let err = ledger
            .approve_cash_in(id, &user.mobile, &agent.mobile, dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientFunds));

        let stored = store.find_entry(id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Pending);
        assert_eq!(balance_of(&store, user.id.unwrap()).await, dec!(0));
    }

    #[tokio::test]
    async fn fee_vault_provisioning_is_idempotent() {
        let (_store, ledger) = harness().await;
        let first = ledger.ensure_fee_account().await.unwrap();
        let second = ledger.ensure_fee_account().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.role, Role::Admin);
        assert_eq!(first.status, AccountStatus::Active);
    }
}
