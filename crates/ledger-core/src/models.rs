use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Storage-assigned row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a financial account.
///
/// Stored as text so new members can be added without touching the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown account type: {0}")]
pub struct UnknownAccountType(pub String);

impl FromStr for AccountType {
    type Err = UnknownAccountType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            other => Err(UnknownAccountType(other.to_string())),
        }
    }
}

/// A persisted account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Caller-supplied fields for a new account. `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInput {
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccountInput {
    pub fn new(name: impl Into<String>, account_type: AccountType, balance: Decimal, currency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type,
            balance,
            currency: currency.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Account {
    /// True when every caller-supplied field matches `input`.
    pub fn matches(&self, input: &AccountInput) -> bool {
        self.name == input.name
            && self.account_type == input.account_type
            && self.balance == input.balance
            && self.currency == input.currency
            && self.description == input.description
    }
}

/// Sum of balances across `accounts`.
///
/// Returns `None` when the accounts are held in more than one currency, since
/// no conversion is performed. An empty slice sums to zero.
pub fn total_balance(accounts: &[Account]) -> Option<Decimal> {
    let mut currencies = accounts.iter().map(|a| a.currency.as_str());
    if let Some(first) = currencies.next() {
        if currencies.any(|c| c != first) {
            return None;
        }
    }
    Some(accounts.iter().map(|a| a.balance).sum())
}
