use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use ledger_core::AccountType;
use ledger_sqlite::StoreOptions;
use serde::Deserialize;

pub const DEFAULT_STORE_FILE: &str = "app_data.db";

#[derive(Parser, Debug)]
#[command(name = "ledger", about = "Ledger - track your financial accounts")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "ledger.toml")]
    pub config: String,

    /// Path to the account store (overrides config file)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Extra initialization attempts after a retryable storage failure
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List all accounts ordered by name
    List {
        /// Print accounts as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create a new account
    Create {
        #[arg(long)]
        name: String,
        #[arg(long = "type", default_value = "checking")]
        account_type: AccountType,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        balance: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an account by id
    Delete { id: i64 },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Create the data directory when it is missing.
    #[serde(default = "default_true")]
    pub create_dirs: bool,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub wal: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("ledger").join(DEFAULT_STORE_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: default_store_path(),
            create_dirs: true,
            busy_timeout_ms: default_busy_timeout_ms(),
            wal: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            logging: default_logging(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(ref db) = cli.db {
            config.storage.path = db.clone();
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }

        config
    }

    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::file(&self.storage.path);
        options.create_dirs = self.storage.create_dirs;
        options.busy_timeout = Duration::from_millis(self.storage.busy_timeout_ms);
        options.wal = self.storage.wal;
        options
    }
}
