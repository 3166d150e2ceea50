//! Read-side queries over the transaction log.

use std::sync::Arc;

use crate::error::ServiceError;
use crate::models::{EntryStatus, TransactionEntry};
use crate::store::LedgerStore;

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const DEFAULT_AGENT_HISTORY_LIMIT: i64 = 20;

/// Caller-supplied limits are clamped so one request cannot page the whole
/// log.
fn clamp_limit(requested: Option<i64>, default: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, 100)
}

#[derive(Clone)]
pub struct TransactionQuery {
    store: Arc<dyn LedgerStore>,
}

impl TransactionQuery {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Entries touching the mobile as sender or receiver, newest first.
    pub async fn history_for(
        &self,
        mobile: &str,
        requested_limit: Option<i64>,
        default_limit: i64,
    ) -> Result<Vec<TransactionEntry>, ServiceError> {
        let limit = clamp_limit(requested_limit, default_limit);
        Ok(self.store.entries_for_mobile(mobile, limit).await?)
    }

    /// Cash-in requests an agent can still act on, plus the ones already
    /// settled. Rejected requests drop out of this view.
    pub async fn pending_and_success_for(
        &self,
        agent_email: &str,
    ) -> Result<Vec<TransactionEntry>, ServiceError> {
        let agent = self
            .store
            .find_by_identifier(agent_email)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        Ok(self
            .store
            .entries_by_sender(&agent.mobile, &[EntryStatus::Pending, EntryStatus::Success])
            .await?)
    }

    /// The whole log, newest first. The route layer restricts this to admins.
    pub async fn all_transactions(&self) -> Result<Vec<TransactionEntry>, ServiceError> {
        Ok(self.store.all_entries().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, AccountStatus, EntryKind, Role};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn limits_are_clamped_to_a_sane_page() {
        assert_eq!(clamp_limit(None, DEFAULT_HISTORY_LIMIT), 10);
        assert_eq!(clamp_limit(None, DEFAULT_AGENT_HISTORY_LIMIT), 20);
        assert_eq!(clamp_limit(Some(7), 10), 7);
        assert_eq!(clamp_limit(Some(0), 10), 1);
        assert_eq!(clamp_limit(Some(-5), 10), 1);
        assert_eq!(clamp_limit(Some(2500), 10), 100);
    }

    async fn seeded_agent(store: &MemoryStore) -> Account {
        let mut agent = Account::new(
            "Agent".into(),
            "agent@example.com".into(),
            "01800000001".into(),
            Role::Agent,
            "hash".into(),
        );
        agent.status = AccountStatus::Active;
        store.insert_account(agent).await.unwrap()
    }

    async fn cash_in_entry(
        store: &MemoryStore,
        agent_mobile: &str,
        amount: Decimal,
    ) -> TransactionEntry {
        let entry = TransactionEntry::new(
            EntryKind::CashIn,
            agent_mobile.into(),
            "01700000001".into(),
            amount,
            Decimal::ZERO,
            EntryStatus::Pending,
        )
        .unwrap();
        store.insert_entry(entry).await.unwrap()
    }

    #[tokio::test]
    async fn history_respects_the_default_and_requested_limits() {
        let store = Arc::new(MemoryStore::new());
        let queries = TransactionQuery::new(store.clone());
        for i in 0..15 {
            cash_in_entry(&store, "01800000001", Decimal::from(i + 1)).await;
        }

        let page = queries
            .history_for("01700000001", None, DEFAULT_HISTORY_LIMIT)
            .await
            .unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].amount().unwrap(), dec!(15));

        let page = queries
            .history_for("01700000001", Some(3), DEFAULT_HISTORY_LIMIT)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn agent_request_view_hides_rejected_entries() {
        let store = Arc::new(MemoryStore::new());
        let queries = TransactionQuery::new(store.clone());
        let agent = seeded_agent(&store).await;

        cash_in_entry(&store, &agent.mobile, dec!(10)).await;
        let rejected = cash_in_entry(&store, &agent.mobile, dec!(20)).await;
        store.reject_entry(rejected.id.unwrap()).await.unwrap();
        cash_in_entry(&store, "01899999999", dec!(30)).await;

        let view = queries
            .pending_and_success_for(&agent.email)
            .await
            .unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].amount().unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn agent_request_view_needs_a_known_account() {
        let store = Arc::new(MemoryStore::new());
        let queries = TransactionQuery::new(store);
        let err = queries
            .pending_and_success_for("ghost@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountNotFound));
    }

    #[tokio::test]
    async fn full_log_is_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let queries = TransactionQuery::new(store.clone());
        cash_in_entry(&store, "01800000001", dec!(1)).await;
        cash_in_entry(&store, "01800000001", dec!(2)).await;

        let all = queries.all_transactions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].amount().unwrap(), dec!(2));
        assert_eq!(all[1].amount().unwrap(), dec!(1));
    }
}
