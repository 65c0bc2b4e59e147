use std::{
    fmt,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use rusqlite::Connection;

use crate::schema;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the account store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    /// Private in-memory database, discarded when the handle closes.
    Memory,
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::File(path) => write!(f, "{}", path.display()),
            StoreLocation::Memory => f.write_str(":memory:"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub location: StoreLocation,
    /// Create missing parent directories of a file store.
    pub create_dirs: bool,
    pub busy_timeout: Duration,
    /// Use write-ahead logging for file stores.
    pub wal: bool,
}

impl StoreOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            create_dirs: true,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: true,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            create_dirs: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: false,
        }
    }
}

/// Raw failure from the storage engine, before classification.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Misconfigured(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Opens connections to the storage engine.
pub trait Connector: Send + Sync + 'static {
    /// Human-readable name of the store, used in logs and error messages.
    fn target(&self) -> String;

    fn connect(&self) -> Result<Connection, EngineError>;
}

pub struct SqliteConnector {
    options: StoreOptions,
}

impl SqliteConnector {
    pub fn new(options: StoreOptions) -> Self {
        Self { options }
    }

    fn prepare_path(&self, path: &Path) -> Result<(), EngineError> {
        if path.as_os_str().is_empty() {
            return Err(EngineError::Misconfigured("store path is empty".to_string()));
        }
        if path.is_dir() {
            return Err(EngineError::Misconfigured(format!(
                "store path {} is a directory",
                path.display()
            )));
        }

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => return Ok(()),
        };
        if let Some(existing) = parent.ancestors().find(|p| p.exists()) {
            if !existing.is_dir() {
                return Err(EngineError::Misconfigured(format!(
                    "{} is not a directory",
                    existing.display()
                )));
            }
        }
        if !parent.exists() {
            if !self.options.create_dirs {
                return Err(EngineError::Misconfigured(format!(
                    "data directory {} does not exist",
                    parent.display()
                )));
            }
            std::fs::create_dir_all(parent)?;
            tracing::debug!(dir = %parent.display(), "created data directory");
        }
        Ok(())
    }
}

/// Open the store file for reading and writing, creating it if absent.
///
/// SQLite reports an unwritable data directory as a bare `CANTOPEN`, so
/// access is checked with the OS first to keep `PermissionDenied` intact.
fn check_access(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map(|_| ())
}

impl Connector for SqliteConnector {
    fn target(&self) -> String {
        self.options.location.to_string()
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        let conn = match &self.options.location {
            StoreLocation::Memory => Connection::open_in_memory()?,
            StoreLocation::File(path) => {
                self.prepare_path(path)?;
                check_access(path)?;
                Connection::open(path)?
            }
        };

        conn.busy_timeout(self.options.busy_timeout)?;
        conn.execute_batch(schema::PRAGMAS)?;
        if self.options.wal && matches!(self.options.location, StoreLocation::File(_)) {
            conn.execute_batch(schema::WAL)?;
        }
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("app_data.db");
        let connector = SqliteConnector::new(StoreOptions::file(&path));

        let conn = connector.connect().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        assert!(path.exists());
    }

    #[test]
    fn test_connect_rejects_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(StoreOptions::file(dir.path()));
        assert!(matches!(connector.connect(), Err(EngineError::Misconfigured(_))));
    }

    #[test]
    fn test_connect_without_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = StoreOptions::file(dir.path().join("missing").join("app_data.db"));
        options.create_dirs = false;
        let connector = SqliteConnector::new(options);

        match connector.connect() {
            Err(EngineError::Misconfigured(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("expected misconfiguration, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_connect_rejects_file_as_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let connector = SqliteConnector::new(StoreOptions::file(blocker.join("sub").join("app_data.db")));

        assert!(matches!(connector.connect(), Err(EngineError::Misconfigured(_))));
    }

    /// Directory the current user cannot write to, or `None` when permission
    /// bits are not enforced (running as root).
    #[cfg(unix)]
    fn read_only_dir(parent: &Path) -> Option<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let locked = parent.join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();
        if std::fs::write(locked.join("write_check"), b"").is_ok() {
            return None;
        }
        Some(locked)
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_directory_reports_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let Some(locked) = read_only_dir(dir.path()) else {
            return;
        };
        let connector = SqliteConnector::new(StoreOptions::file(locked.join("app_data.db")));

        match connector.connect() {
            Err(EngineError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("expected permission denied, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_in_memory_target() {
        let connector = SqliteConnector::new(StoreOptions::in_memory());
        assert_eq!(connector.target(), ":memory:");
        assert!(connector.connect().is_ok());
    }
}
