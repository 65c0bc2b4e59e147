use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use ledger_core::{ErrorKind, StoreError};
use rusqlite::{ffi, Connection};
use tokio::sync::watch;

use crate::{
    connector::{Connector, EngineError, SqliteConnector, StoreOptions},
    schema,
};

pub(crate) type Handle = Arc<Mutex<Connection>>;

type Outcome = Option<Result<Handle, StoreError>>;

const CANTOPEN_ISDIR: i32 = ffi::SQLITE_CANTOPEN | (2 << 8);
const CANTOPEN_FULLPATH: i32 = ffi::SQLITE_CANTOPEN | (3 << 8);

enum Slot {
    Unopened,
    Opening(watch::Receiver<Outcome>),
    Ready(Handle),
}

/// Counters describing how the manager reached readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessStats {
    /// Initialization attempts started, successful or not.
    pub attempts: u64,
    /// Handles successfully opened.
    pub handles_opened: u64,
    /// Schema statements issued.
    pub schema_runs: u64,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    handles_opened: AtomicU64,
    schema_runs: AtomicU64,
}

struct Inner {
    connector: Box<dyn Connector>,
    slot: Mutex<Slot>,
    counters: Counters,
}

/// Owns the single connection to the account store.
///
/// The handle is opened lazily by the first [`ensure_ready`] call and kept
/// for the life of the manager. Overlapping first calls share one
/// initialization attempt and all of them observe its outcome. A failed
/// attempt leaves the manager unopened so the next call starts over.
///
/// Clones share the same connection; create one manager per store.
///
/// [`ensure_ready`]: ConnectionManager::ensure_ready
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                slot: Mutex::new(Slot::Unopened),
                counters: Counters::default(),
            }),
        }
    }

    pub fn sqlite(options: StoreOptions) -> Self {
        Self::new(SqliteConnector::new(options))
    }

    pub fn target(&self) -> String {
        self.inner.connector.target()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.lock_slot(), Slot::Ready(_))
    }

    pub fn stats(&self) -> ReadinessStats {
        let counters = &self.inner.counters;
        ReadinessStats {
            attempts: counters.attempts.load(Ordering::SeqCst),
            handles_opened: counters.handles_opened.load(Ordering::SeqCst),
            schema_runs: counters.schema_runs.load(Ordering::SeqCst),
        }
    }

    /// Open the store and create the schema unless that already happened.
    pub async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    pub(crate) async fn handle(&self) -> Result<Handle, StoreError> {
        let mut rx = {
            let mut slot = self.inner.lock_slot();
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Opening(rx) => rx.clone(),
                Slot::Unopened => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Slot::Opening(rx.clone());
                    let inner = self.inner.clone();
                    // Detached so a caller that stops waiting does not abort setup.
                    tokio::task::spawn_blocking(move || inner.initialize(tx));
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => {
                self.inner.reset_abandoned();
                None
            }
        };
        outcome.unwrap_or_else(|| {
            Err(StoreError::storage(
                format!("failed to open account store at {}", self.target()),
                "initialization ended without a result",
            ))
        })
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize(&self, tx: watch::Sender<Outcome>) {
        let attempt = self.counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let target = self.connector.target();
        tracing::debug!(attempt, target = %target, "opening account store");

        let outcome = self.open(&target);
        match &outcome {
            Ok(_) => tracing::info!(attempt, target = %target, "account store ready"),
            Err(e) => tracing::warn!(attempt, target = %target, error = %e, "account store initialization failed"),
        }

        *self.lock_slot() = match &outcome {
            Ok(handle) => Slot::Ready(handle.clone()),
            Err(_) => Slot::Unopened,
        };
        tx.send_replace(Some(outcome));
    }

    fn open(&self, target: &str) -> Result<Handle, StoreError> {
        let conn = self
            .connector
            .connect()
            .map_err(|e| classified(target, e))?;
        self.counters.handles_opened.fetch_add(1, Ordering::SeqCst);

        self.counters.schema_runs.fetch_add(1, Ordering::SeqCst);
        // On failure `conn` is dropped here, closing the half-initialized handle.
        conn.execute_batch(schema::CREATE_TABLES)
            .map_err(|e| classified(target, e.into()))?;

        Ok(Arc::new(Mutex::new(conn)))
    }

    /// Clear an `Opening` slot whose setup task went away without reporting.
    fn reset_abandoned(&self) {
        let mut slot = self.lock_slot();
        if let Slot::Opening(rx) = &*slot {
            if rx.has_changed().is_err() {
                *slot = Slot::Unopened;
            }
        }
    }
}

fn classified(target: &str, err: EngineError) -> StoreError {
    match classify(&err) {
        ErrorKind::Configuration => StoreError::Configuration(format!("{target}: {err}")),
        ErrorKind::Permission => StoreError::Permission(format!("{target}: {err}")),
        ErrorKind::Storage => {
            StoreError::storage(format!("failed to open account store at {target}"), err)
        }
    }
}

/// Classify an open or setup failure.
///
/// SQLite result codes and I/O error kinds decide where present; the message
/// is only consulted for errors that carry neither.
pub fn classify(err: &EngineError) -> ErrorKind {
    match err {
        EngineError::Misconfigured(_) => ErrorKind::Configuration,
        EngineError::Io(e) => match e.kind() {
            io::ErrorKind::PermissionDenied => ErrorKind::Permission,
            io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => ErrorKind::Configuration,
            _ => classify_message(&e.to_string()),
        },
        EngineError::Sqlite(rusqlite::Error::SqliteFailure(code, message)) => {
            classify_code(code, message.as_deref())
        }
        EngineError::Sqlite(rusqlite::Error::InvalidPath(_))
        | EngineError::Sqlite(rusqlite::Error::NulError(_)) => ErrorKind::Configuration,
        EngineError::Sqlite(other) => classify_message(&other.to_string()),
    }
}

fn classify_code(err: &ffi::Error, message: Option<&str>) -> ErrorKind {
    match err.code {
        ffi::ErrorCode::PermissionDenied
        | ffi::ErrorCode::ReadOnly
        | ffi::ErrorCode::AuthorizationForStatementDenied => ErrorKind::Permission,
        ffi::ErrorCode::NotADatabase => ErrorKind::Configuration,
        ffi::ErrorCode::CannotOpen => match err.extended_code {
            CANTOPEN_ISDIR | CANTOPEN_FULLPATH => ErrorKind::Configuration,
            _ => match message.map(classify_message) {
                Some(ErrorKind::Permission) => ErrorKind::Permission,
                _ => ErrorKind::Configuration,
            },
        },
        _ => ErrorKind::Storage,
    }
}

fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_ascii_lowercase();
    if message.contains("permission") || message.contains("access denied") {
        ErrorKind::Permission
    } else if message.contains("not found") {
        ErrorKind::Configuration
    } else {
        ErrorKind::Storage
    }
}
