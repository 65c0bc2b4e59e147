use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Account, AccountId, AccountInput};

/// Classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend absent or misconfigured. Fatal until the environment is fixed.
    Configuration,
    /// Access to the store was denied. Fatal until the environment is fixed.
    Permission,
    /// Generic operational failure, possibly transient.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage backend is not configured correctly: {0}")]
    Configuration(String),
    #[error("permission denied when accessing storage: {0}")]
    Permission(String),
    #[error("{context}: {message}")]
    Storage { context: String, message: String },
}

impl StoreError {
    pub fn storage(context: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Configuration(_) => ErrorKind::Configuration,
            StoreError::Permission(_) => ErrorKind::Permission,
            StoreError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Whether re-invoking the same call may succeed without outside action.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

/// Account persistence surface consumed by the presentation layer.
///
/// Every operation makes sure the store is ready before issuing its
/// statement, so callers may skip `initialize` entirely. Readiness failures
/// are returned with their classification intact.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Open the store and create the schema if it is absent.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// All accounts ordered by name.
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Insert one account, returning its id when the backend reports one.
    async fn create(&self, input: &AccountInput) -> Result<Option<AccountId>, StoreError>;

    /// Remove an account. Deleting an id that does not exist succeeds.
    async fn delete(&self, id: AccountId) -> Result<(), StoreError>;
}
