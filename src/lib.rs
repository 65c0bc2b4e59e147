//! Ledger: local storage for a small set of financial accounts.
//!
//! The storage layer lives in `ledger-core` (model, errors, `AccountStore`)
//! and `ledger-sqlite` (connection manager and SQLite store). This crate adds
//! what a host application needs on top: configuration, the start-up
//! [`readiness::StoreGate`], and validation of user-entered account details.

pub mod config;
pub mod form;
pub mod readiness;
pub mod tracing_setup;

pub use ledger_core::{
    total_balance, Account, AccountId, AccountInput, AccountStore, AccountType, ErrorKind, StoreError,
};
pub use ledger_sqlite::{ConnectionManager, SqliteAccountStore, StoreOptions};
