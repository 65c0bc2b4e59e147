//! Core types and traits for Ledger account storage backends.
//!
//! This crate provides the `AccountStore` trait and the account model,
//! enabling pluggable storage implementations in separate crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{total_balance, Account, AccountId, AccountInput, AccountType, UnknownAccountType};
pub use storage::{AccountStore, ErrorKind, StoreError};
