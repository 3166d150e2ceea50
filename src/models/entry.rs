use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime, Decimal128};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{self, MoneyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    SendMoney,
    CashOut,
    CashIn,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::SendMoney => "send_money",
            EntryKind::CashOut => "cash_out",
            EntryKind::CashIn => "cash_in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Success,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Success => "success",
            EntryStatus::Rejected => "rejected",
        }
    }
}

/// One row of the append-only transaction log. Only `status` is ever
/// rewritten, and only for the pending -> success / rejected transition of
/// cash-in requests.
///
/// The receiver is always the credited party: for send-money that is the
/// recipient user, for cash-out the agent, for cash-in the requesting user
/// (the agent is the source of funds). `amount` is the net credited to the
/// receiver; the fee is carried separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sender_mobile: String,
    pub receiver_mobile: String,
    pub amount: Decimal128,
    pub fee: Decimal128,
    pub status: EntryStatus,
    pub created_at: DateTime,
}

impl TransactionEntry {
    pub fn new(
        kind: EntryKind,
        sender_mobile: String,
        receiver_mobile: String,
        amount: Decimal,
        fee: Decimal,
        status: EntryStatus,
    ) -> Result<Self, MoneyError> {
        Ok(Self {
            id: None,
            kind,
            sender_mobile,
            receiver_mobile,
            amount: money::to_decimal128(amount)?,
            fee: money::to_decimal128(fee)?,
            status,
            created_at: DateTime::now(),
        })
    }

    pub fn amount(&self) -> Result<Decimal, MoneyError> {
        money::to_decimal(self.amount)
    }

    pub fn fee(&self) -> Result<Decimal, MoneyError> {
        money::to_decimal(self.fee)
    }
}

/// Wire projection of an entry. Fields are camelCase to match the request
/// bodies; amounts go out as strings and the timestamp as RFC 3339.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sender_mobile: String,
    pub receiver_mobile: String,
    pub amount: String,
    pub fee: String,
    pub status: EntryStatus,
    pub created_at: ChronoDateTime<Utc>,
}

impl From<&TransactionEntry> for EntryView {
    fn from(entry: &TransactionEntry) -> Self {
        Self {
            id: entry.id.map_or_else(String::new, |id| id.to_hex()),
            kind: entry.kind,
            sender_mobile: entry.sender_mobile.clone(),
            receiver_mobile: entry.receiver_mobile.clone(),
            amount: entry.amount.to_string(),
            fee: entry.fee.to_string(),
            status: entry.status,
            created_at: entry.created_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entry_round_trips_amounts() {
        let entry = TransactionEntry::new(
            EntryKind::CashOut,
            "01700000001".into(),
            "01800000001".into(),
            Decimal::from_str("250").unwrap(),
            Decimal::from_str("4").unwrap(),
            EntryStatus::Success,
        )
        .unwrap();
        assert_eq!(entry.amount().unwrap(), Decimal::from_str("250").unwrap());
        assert_eq!(entry.fee().unwrap(), Decimal::from_str("4").unwrap());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&EntryKind::SendMoney).unwrap();
        assert_eq!(json, "\"send_money\"");
        let json = serde_json::to_string(&EntryKind::CashIn).unwrap();
        assert_eq!(json, "\"cash_in\"");
    }

    #[test]
    fn document_field_is_named_type() {
        let entry = TransactionEntry::new(
            EntryKind::CashIn,
            "01800000001".into(),
            "01700000001".into(),
            Decimal::from_str("50").unwrap(),
            Decimal::ZERO,
            EntryStatus::Pending,
        )
        .unwrap();
        let doc = mongodb::bson::to_document(&entry).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "cash_in");
        assert_eq!(doc.get_str("status").unwrap(), "pending");
    }

    #[test]
    fn view_serializes_camel_case_with_rfc3339_timestamp() {
        let entry = TransactionEntry::new(
            EntryKind::SendMoney,
            "01700000001".into(),
            "01700000002".into(),
            Decimal::from_str("145").unwrap(),
            Decimal::from_str("5").unwrap(),
            EntryStatus::Success,
        )
        .unwrap();
        let view = EntryView::from(&entry);
        assert_eq!(
            view.created_at.timestamp_millis(),
            entry.created_at.timestamp_millis()
        );

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["senderMobile"], "01700000001");
        assert_eq!(json["receiverMobile"], "01700000002");
        assert_eq!(json["type"], "send_money");
        assert_eq!(json["amount"], "145");
        assert!(json.get("sender_mobile").is_none());
        let created_at = json["createdAt"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    }
}
