use mongodb::bson::{oid::ObjectId, DateTime, Decimal128};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{self, MoneyError};

/// Account roles. The fee vault is a regular admin account, so no extra
/// variant is needed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: Role,
    pub pin_hash: String,
    pub balance: Decimal128,
    pub status: AccountStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Account {
    /// A freshly registered account: pending until an admin activates it,
    /// zero balance.
    pub fn new(name: String, email: String, mobile: String, role: Role, pin_hash: String) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            name,
            email,
            mobile,
            role,
            pin_hash,
            balance: money::zero(),
            status: AccountStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balance(&self) -> Result<Decimal, MoneyError> {
        money::to_decimal(self.balance)
    }
}

/// Public projection of an account. `pin_hash` never leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub role: Role,
    pub balance: String,
    pub status: AccountStatus,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.map_or_else(String::new, |id| id.to_hex()),
            name: account.name.clone(),
            email: account.email.clone(),
            mobile: account.mobile.clone(),
            role: account.role,
            balance: account.balance.to_string(),
            status: account.status,
        }
    }
}
