#![allow(dead_code)]

use ledgerguard::application::admission::AdmissionGate;
use ledgerguard::application::audit_sink::{AuditSink, AuditWorkers};
use ledgerguard::application::auth::Authenticator;
use ledgerguard::application::engine::LedgerEngine;
use ledgerguard::application::rate_limiter::RateLimiter;
use ledgerguard::application::service::Bank;
use ledgerguard::config::Config;
use ledgerguard::domain::account::Account;
use ledgerguard::domain::audit::AuditRecord;
use ledgerguard::domain::ports::AccountStore;
use ledgerguard::infrastructure::in_memory::{InMemoryAccountStore, InMemoryAuditLog, InMemoryCredentials};
use rust_decimal::Decimal;
use std::io::{Error, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A bank wired to in-memory adapters, with handles to inspect them.
pub struct TestBank {
    pub bank: Bank,
    pub store: InMemoryAccountStore,
    pub log: InMemoryAuditLog,
    pub credentials: InMemoryCredentials,
    pub sink: Arc<AuditSink>,
    workers: AuditWorkers,
}

impl TestBank {
    pub fn new(config: Config) -> Self {
        let store = InMemoryAccountStore::new();
        let log = InMemoryAuditLog::new();
        let credentials = InMemoryCredentials::new();
        let (sink, workers) = AuditSink::spawn(Arc::new(log.clone()), &config.audit);

        let bank = Bank::new(
            AdmissionGate::new(Arc::new(RateLimiter::new(config.rate_limit.clone()))),
            LedgerEngine::new(Arc::new(store.clone()), Arc::clone(&sink), config.ledger.clone()),
            Authenticator::new(
                Arc::new(store.clone()),
                Arc::clone(&sink),
                Arc::new(credentials.clone()),
                config.ledger.max_commit_retries,
            ),
        );
        Self {
            bank,
            store,
            log,
            credentials,
            sink,
            workers,
        }
    }

    pub async fn seed(&self, id: &str, owner_id: u64, owner: &str, balance: Decimal) -> Account {
        self.store
            .insert(Account::new(id, owner_id, owner).with_balance(balance))
            .await
            .unwrap()
    }

    pub async fn account(&self, id: &str) -> Account {
        self.store.get(&id.into()).await.unwrap().unwrap()
    }

    /// Shuts the bank down and returns the flushed audit trail.
    pub async fn finish(self) -> Vec<AuditRecord> {
        drop(self.bank);
        drop(self.sink);
        self.workers.shutdown().await;
        self.log.records().await
    }
}

/// Writes an actions CSV with the given header and rows to a temp file.
pub fn write_csv(header: &str, rows: &[&str]) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", header)?;
    for row in rows {
        writeln!(file, "{}", row)?;
    }
    file.flush()?;
    Ok(file)
}
