use clap::Parser;
use ledgerguard::application::admission::AdmissionGate;
use ledgerguard::application::audit_sink::AuditSink;
use ledgerguard::application::auth::Authenticator;
use ledgerguard::application::engine::LedgerEngine;
use ledgerguard::application::rate_limiter::RateLimiter;
use ledgerguard::application::service::Bank;
use ledgerguard::config::Config;
use ledgerguard::domain::account::{Account, AccountId};
use ledgerguard::domain::action::{Action, ActionType};
use ledgerguard::domain::audit::ActionKind;
use ledgerguard::domain::ports::{AccountStoreRef, AuditBackendRef};
use ledgerguard::domain::request::RequestContext;
use ledgerguard::error::{LedgerError, Result as LedgerResult};
use ledgerguard::infrastructure::in_memory::{InMemoryAccountStore, InMemoryAuditLog, InMemoryCredentials};
use ledgerguard::interfaces::csv::account_writer::AccountWriter;
use ledgerguard::interfaces::csv::action_reader::ActionReader;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input actions CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON configuration file (optional). Missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> LedgerResult<(AccountStoreRef, AuditBackendRef)> {
    use ledgerguard::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path)?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> LedgerResult<(AccountStoreRef, AuditBackendRef)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (AccountStoreRef, AuditBackendRef) {
    (Arc::new(InMemoryAccountStore::new()), Arc::new(InMemoryAuditLog::new()))
}

fn required<T>(value: Option<T>, column: &str) -> LedgerResult<T> {
    value.ok_or_else(|| LedgerError::Validation(format!("Missing column: {}", column)))
}

/// A row without an amount is rejected and audited against its account.
fn amount_of(bank: &Bank, ctx: &RequestContext, action: &Action, kind: ActionKind) -> LedgerResult<Decimal> {
    action.amount.ok_or_else(|| {
        let subject = action.account.as_ref().map(AccountId::as_str).unwrap_or_default();
        let err = LedgerError::Validation("Transaction amount cannot be null".to_string());
        bank.reject(ctx, subject, kind, err)
    })
}

async fn apply(bank: &Bank, credentials: &InMemoryCredentials, action: Action) -> LedgerResult<()> {
    let ctx = action.context();
    match action.r#type {
        ActionType::Open => {
            let owner = required(action.owner, "owner")?;
            let account = Account::new(
                required(action.account, "account")?,
                required(action.client, "client")?,
                owner.clone(),
            );
            bank.open_account(&ctx, account).await?;
            if let Some(secret) = action.secret {
                credentials.register(owner, secret).await;
            }
        }
        ActionType::Deposit => {
            let amount = amount_of(bank, &ctx, &action, ActionKind::Deposit)?;
            bank.deposit(&ctx, &required(action.account, "account")?, amount)
                .await?;
        }
        ActionType::Withdrawal => {
            let amount = amount_of(bank, &ctx, &action, ActionKind::Withdrawal)?;
            bank.withdraw(&ctx, &required(action.account, "account")?, amount)
                .await?;
        }
        ActionType::Transfer => {
            let amount = amount_of(bank, &ctx, &action, ActionKind::TransferSend)?;
            let from = required(action.account, "account")?;
            let to = required(action.to, "to")?;
            bank.transfer(&ctx, &from, &to, amount).await?;
        }
        ActionType::Login => {
            let owner = required(action.owner, "owner")?;
            let secret = action.secret.unwrap_or_default();
            bank.login(&ctx, &owner, &secret).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_path(path).into_diagnostic()?,
        None => Config::default(),
    };

    let (store, audit_backend) = open_stores(cli.db_path).into_diagnostic()?;
    let (sink, workers) = AuditSink::spawn(audit_backend, &config.audit);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let sweeper = limiter.spawn_sweeper(Duration::from_secs(60));
    let credentials = InMemoryCredentials::new();

    let bank = Bank::new(
        AdmissionGate::new(limiter),
        LedgerEngine::new(Arc::clone(&store), Arc::clone(&sink), config.ledger.clone()),
        Authenticator::new(
            Arc::clone(&store),
            Arc::clone(&sink),
            Arc::new(credentials.clone()),
            config.ledger.max_commit_retries,
        ),
    );

    // Process actions
    let file = File::open(&cli.input).into_diagnostic()?;
    for (row, action) in ActionReader::new(file).actions().enumerate() {
        let result = match action {
            Ok(action) => apply(&bank, &credentials, action).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(row = row + 1, error = %e, "Action rejected");
        }
    }

    let accounts = store.all().await.into_diagnostic()?;

    // Stop the workers once every sink handle is gone, so the trail is flushed.
    let dropped = sink.dropped();
    drop(bank);
    drop(sink);
    sweeper.abort();
    workers.shutdown().await;
    if dropped > 0 {
        warn!(dropped, "Audit events were dropped");
    }
    info!(accounts = accounts.len(), "Batch complete");

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
