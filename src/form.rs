//! Validation of user-entered account details before they reach the store.

use std::str::FromStr;

use ledger_core::{AccountInput, AccountType};
use rust_decimal::Decimal;
use thiserror::Error;

/// Currencies offered when creating an account.
pub const CURRENCY_OPTIONS: &[&str] = &["USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "INR"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Account name is required")]
    MissingName,
    #[error("Balance must be a valid number")]
    InvalidBalance,
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// Raw form state for a new account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDraft {
    pub name: String,
    pub account_type: AccountType,
    pub balance: String,
    pub currency: String,
    pub description: String,
}

impl Default for AccountDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            account_type: AccountType::Checking,
            balance: "0".to_string(),
            currency: "USD".to_string(),
            description: String::new(),
        }
    }
}

impl AccountDraft {
    pub fn validate(&self) -> Result<AccountInput, DraftError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DraftError::MissingName);
        }

        let balance = parse_balance(&self.balance).ok_or(DraftError::InvalidBalance)?;

        if !CURRENCY_OPTIONS.contains(&self.currency.as_str()) {
            return Err(DraftError::UnsupportedCurrency(self.currency.clone()));
        }

        let description = self.description.trim();
        Ok(AccountInput {
            name: name.to_string(),
            account_type: self.account_type,
            balance,
            currency: self.currency.clone(),
            description: (!description.is_empty()).then(|| description.to_string()),
        })
    }
}

fn parse_balance(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(name: &str, balance: &str) -> AccountDraft {
        AccountDraft {
            name: name.to_string(),
            balance: balance.to_string(),
            ..AccountDraft::default()
        }
    }

    #[test]
    fn test_valid_draft_is_trimmed() {
        let mut d = draft("  Chase Checking ", " 500.00 ");
        d.description = "   ".to_string();
        let input = d.validate().unwrap();
        assert_eq!(input.name, "Chase Checking");
        assert_eq!(input.balance, dec!(500.00));
        assert_eq!(input.currency, "USD");
        assert_eq!(input.description, None);
    }

    #[test]
    fn test_default_balance_is_zero() {
        let input = draft("Cash", &AccountDraft::default().balance).validate().unwrap();
        assert_eq!(input.balance, Decimal::ZERO);
    }

    #[test]
    fn test_rejects_blank_name() {
        assert_eq!(draft("   ", "1").validate(), Err(DraftError::MissingName));
    }

    #[test]
    fn test_rejects_non_numeric_balance() {
        for bad in ["", "abc", "NaN", "inf"] {
            assert_eq!(draft("A", bad).validate(), Err(DraftError::InvalidBalance), "{bad:?}");
        }
        assert_eq!(draft("A", "-1.5e2").validate().unwrap().balance, dec!(-150));
    }

    #[test]
    fn test_currency_allow_list() {
        let mut d = draft("A", "1");
        d.currency = "XYZ".to_string();
        assert_eq!(d.validate(), Err(DraftError::UnsupportedCurrency("XYZ".to_string())));

        d.currency = "JPY".to_string();
        assert_eq!(d.validate().unwrap().currency, "JPY");
    }
}
