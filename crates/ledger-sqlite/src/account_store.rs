use std::{str::FromStr, sync::PoisonError};

use async_trait::async_trait;
use ledger_core::{Account, AccountId, AccountInput, AccountStore, AccountType, StoreError};
use rusqlite::{params, types::ValueRef, Connection, Row};
use rust_decimal::Decimal;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::{connection::ConnectionManager, connector::StoreOptions};

const SELECT_ACCOUNTS: &str = "
    SELECT id, name, accountType, balance, currency, description, createdAt
    FROM accounts
    ORDER BY name, id";

const INSERT_ACCOUNT: &str = "
    INSERT INTO accounts (name, accountType, balance, currency, description)
    VALUES (?1, ?2, ?3, ?4, ?5)";

const DELETE_ACCOUNT: &str = "DELETE FROM accounts WHERE id = ?1";

#[derive(Debug, thiserror::Error)]
enum StatementError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt row in accounts: {0}")]
    CorruptRow(String),
}

/// Account CRUD over a SQLite store.
///
/// Every call makes sure the store is ready first, then issues a single
/// statement on a blocking task.
#[derive(Clone)]
pub struct SqliteAccountStore {
    connections: ConnectionManager,
}

impl SqliteAccountStore {
    pub fn new(connections: ConnectionManager) -> Self {
        Self { connections }
    }

    pub fn open(options: StoreOptions) -> Self {
        Self::new(ConnectionManager::sqlite(options))
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    async fn run<T, F>(&self, context: String, statement: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StatementError> + Send + 'static,
    {
        let handle = self.connections.handle().await?;
        // A detached blocking task: the statement completes even if the caller
        // stops awaiting.
        let result = tokio::task::spawn_blocking(move || {
            let conn = handle.lock().unwrap_or_else(PoisonError::into_inner);
            statement(&conn)
        })
        .await
        .map_err(|e| StoreError::storage(context.clone(), e))?;

        result.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            StoreError::storage(context, e)
        })
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.connections.ensure_ready().await
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self
            .run("failed to get accounts".to_string(), |conn| {
                let mut stmt = conn.prepare(SELECT_ACCOUNTS)?;
                let mut rows = stmt.query([])?;
                let mut accounts = Vec::new();
                while let Some(row) = rows.next()? {
                    accounts.push(read_account(row)?);
                }
                Ok(accounts)
            })
            .await?;
        tracing::debug!(count = accounts.len(), "listed accounts");
        Ok(accounts)
    }

    async fn create(&self, input: &AccountInput) -> Result<Option<AccountId>, StoreError> {
        let input = input.clone();
        let id = self
            .run("failed to create account".to_string(), move |conn| {
                let inserted = conn.execute(
                    INSERT_ACCOUNT,
                    params![
                        input.name,
                        input.account_type.as_str(),
                        input.balance.to_string(),
                        input.currency,
                        input.description,
                    ],
                )?;
                Ok((inserted == 1).then(|| AccountId(conn.last_insert_rowid())))
            })
            .await?;
        match id {
            Some(id) => tracing::debug!(id = %id, "created account"),
            None => tracing::debug!("created account without a reported id"),
        }
        Ok(id)
    }

    async fn delete(&self, id: AccountId) -> Result<(), StoreError> {
        let removed = self
            .run(format!("failed to delete account with id {id}"), move |conn| {
                Ok(conn.execute(DELETE_ACCOUNT, params![id.0])?)
            })
            .await?;
        tracing::debug!(id = %id, removed, "deleted account");
        Ok(())
    }
}

fn read_account(row: &Row<'_>) -> Result<Account, StatementError> {
    let id: i64 = row.get(0)?;
    let corrupt = |detail: String| StatementError::CorruptRow(format!("account {id}: {detail}"));

    let account_type: String = row.get(2)?;
    let account_type = AccountType::from_str(&account_type).map_err(|e| corrupt(e.to_string()))?;
    let balance = decode_balance(row.get_ref(3)?).map_err(|e| corrupt(format!("invalid balance: {e}")))?;
    let created_at =
        decode_timestamp(row.get_ref(6)?).map_err(|e| corrupt(format!("invalid createdAt: {e}")))?;

    Ok(Account {
        id: AccountId(id),
        name: row.get(1)?,
        account_type,
        balance,
        currency: row.get(4)?,
        description: row.get(5)?,
        created_at,
    })
}

/// Balances are written as decimal text; stores created by older versions of
/// the app hold them as REAL or INTEGER.
fn decode_balance(value: ValueRef<'_>) -> Result<Decimal, String> {
    match value {
        ValueRef::Text(raw) => {
            let text = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map_err(|e| format!("{text:?}: {e}"))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f).map_err(|e| e.to_string()),
        ValueRef::Null => Err("missing value".to_string()),
        ValueRef::Blob(_) => Err("unexpected blob".to_string()),
    }
}

/// `CURRENT_TIMESTAMP` text is UTC without an offset.
fn decode_timestamp(value: ValueRef<'_>) -> Result<OffsetDateTime, String> {
    let raw = match value {
        ValueRef::Text(raw) => std::str::from_utf8(raw).map_err(|e| e.to_string())?,
        ValueRef::Null => return Err("missing value".to_string()),
        _ => return Err("expected text".to_string()),
    };
    let sqlite_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, sqlite_format)
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .map_err(|e| format!("{raw:?}: {e}"))
}
