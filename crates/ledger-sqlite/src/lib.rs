//! SQLite backend for Ledger accounts.
//!
//! [`ConnectionManager`] owns the single connection and the one-time schema
//! setup; [`SqliteAccountStore`] runs the account statements on top of it.

pub mod account_store;
pub mod connection;
pub mod connector;
pub mod schema;

pub use account_store::SqliteAccountStore;
pub use connection::{classify, ConnectionManager, ReadinessStats};
pub use connector::{Connector, EngineError, SqliteConnector, StoreLocation, StoreOptions};
