use std::{error::Error, process::ExitCode};

use clap::Parser;
use ledger::{
    config::{CliArgs, Command, Config},
    form::AccountDraft,
    readiness::StoreGate,
    total_balance, tracing_setup, Account, AccountId, AccountStore, SqliteAccountStore, StoreError,
};
use prettytable::{row, Table};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);

    if let Err(e) = tracing_setup::init_tracing(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let gate = StoreGate::new(SqliteAccountStore::open(config.store_options()));
    tracing::debug!(path = %config.storage.path.display(), "using account store");

    if let Err(e) = initialize(&gate, cli.retries).await {
        eprintln!("Database error: {}", e);
        eprintln!(
            "If the problem persists, make sure the data directory is writable and the store path is configured correctly."
        );
        return ExitCode::from(2);
    }
    let accounts = match gate.accounts() {
        Ok(accounts) => accounts,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(accounts, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// First attempt plus up to `retries` more, stopping at the first fatal error.
async fn initialize<S: AccountStore>(gate: &StoreGate<S>, retries: u32) -> Result<(), StoreError> {
    let mut result = gate.initialize().await;
    for _ in 0..retries {
        match &result {
            Err(e) if e.is_retryable() => result = gate.retry().await,
            _ => break,
        }
    }
    result
}

async fn run<S: AccountStore>(accounts: &S, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::List { json } => {
            let list = accounts.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print_accounts(&list);
            }
        }
        Command::Create { name, account_type, balance, currency, description } => {
            let draft = AccountDraft {
                name,
                account_type,
                balance,
                currency,
                description: description.unwrap_or_default(),
            };
            let input = draft.validate()?;
            match accounts.create(&input).await? {
                Some(id) => println!("Created account {}", id),
                None => println!("Created account"),
            }
        }
        Command::Delete { id } => {
            let id = AccountId(id);
            accounts.delete(id).await?;
            println!("Deleted account {}", id);
        }
    }
    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts found. Create your first account with `ledger create`.");
        return;
    }

    let mut table = Table::new();
    table.add_row(row!["ID", "Name", "Type", "Balance", "Currency", "Description", "Created"]);
    for account in accounts {
        let balance = format!("{:.2}", account.balance);
        table.add_row(row![
            account.id,
            account.name,
            account.account_type,
            r->balance,
            account.currency,
            account.description.as_deref().unwrap_or(""),
            account.created_at
        ]);
    }
    table.printstd();

    if let Some(total) = total_balance(accounts) {
        println!("Total balance: {:.2} {}", total, accounts[0].currency);
    }
}
