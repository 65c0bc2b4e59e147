//! DDL for the account store. Every statement is safe to re-run.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    accountType TEXT NOT NULL,
    balance TEXT NOT NULL DEFAULT '0',
    currency TEXT NOT NULL DEFAULT 'USD',
    description TEXT,
    createdAt TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Connection settings applied before the schema is created.
pub const PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;
"#;

pub const WAL: &str = "PRAGMA journal_mode = WAL;";
