use crate::domain::account::{Account, AccountId};
use crate::domain::audit::AuditRecord;
use crate::domain::ports::{AccountStore, AuditBackend, CredentialVerifier};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for accounts.
///
/// Uses `Arc<RwLock<HashMap<AccountId, Account>>>` to allow shared concurrent access.
/// `commit` validates and applies under a single write guard, which makes every
/// commit serializable with respect to every other.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).cloned())
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.owner == owner).cloned())
    }

    async fn insert(&self, mut account: Account) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(LedgerError::Validation(format!(
                "Account already exists: {}",
                account.id
            )));
        }
        account.version = 1;
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn commit(&self, changes: Vec<Account>) -> Result<Vec<Account>> {
        let mut accounts = self.accounts.write().await;

        for (i, change) in changes.iter().enumerate() {
            if changes[..i].iter().any(|c| c.id == change.id) {
                return Err(LedgerError::Validation(format!(
                    "Account {} appears twice in one commit",
                    change.id
                )));
            }
            match accounts.get(&change.id) {
                Some(current) if current.version == change.version => {}
                Some(_) => return Err(LedgerError::Conflict(change.id.to_string())),
                None => return Err(LedgerError::NotFound(format!("Account not found: {}", change.id))),
            }
        }

        let committed: Vec<Account> = changes
            .into_iter()
            .map(|mut account| {
                account.version += 1;
                account
            })
            .collect();
        for account in &committed {
            accounts.insert(account.id.clone(), account.clone());
        }
        Ok(committed)
    }

    async fn all(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// An in-memory audit trail. Records are kept in write order.
#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditBackend for InMemoryAuditLog {
    async fn write(&self, record: AuditRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

/// Username to secret table. Secrets are compared as given; hashing belongs to a
/// real credential service.
#[derive(Default, Clone)]
pub struct InMemoryCredentials {
    secrets: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, username: impl Into<String>, secret: impl Into<String>) {
        self.secrets.write().await.insert(username.into(), secret.into());
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryCredentials {
    async fn verify(&self, account: &Account, secret: &str) -> Result<bool> {
        let secrets = self.secrets.read().await;
        Ok(secrets.get(&account.owner).is_some_and(|known| known == secret))
    }
}
