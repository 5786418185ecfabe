use super::account::{Account, AccountId};
use super::audit::AuditRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: &AccountId) -> Result<Option<Account>>;
    async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>>;
    /// Inserts a new account. Fails with `Validation` if the id is taken.
    async fn insert(&self, account: Account) -> Result<Account>;
    /// Atomically replaces every given account, provided each one's `version`
    /// still matches the stored record. Returns the committed records with their
    /// versions bumped, or `Conflict` without applying anything.
    async fn commit(&self, accounts: Vec<Account>) -> Result<Vec<Account>>;
    async fn all(&self) -> Result<Vec<Account>>;
}

/// Durable, append-only destination of the audit trail.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    async fn write(&self, record: AuditRecord) -> Result<()>;
}

/// Checks a presented secret against the credential on file for a user.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, account: &Account, secret: &str) -> Result<bool>;
}

/// Decides whether a locked account may be unlocked. Deployments that offer an
/// unlock path (timed, administrative) provide one; without it a lock is final.
#[async_trait]
pub trait UnlockPolicy: Send + Sync {
    async fn may_unlock(&self, account: &Account) -> Result<bool>;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type AuditBackendRef = Arc<dyn AuditBackend>;
