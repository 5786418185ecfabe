use crate::domain::account::{Account, AccountId};
use crate::domain::audit::AuditRecord;
use crate::domain::ports::{AccountStore, AuditBackend};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for the append-only audit trail.
pub const CF_AUDIT: &str = "audit";

/// A persistent store implementation using RocksDB.
///
/// Accounts and audit records live in separate Column Families. Account commits
/// are serialized through `commit_lock` and written as a single `WriteBatch`, so
/// a multi-account commit lands entirely or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    audit_seq: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("accounts" and "audit") exist
    /// and resumes the audit sequence after the last stored record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_audit = ColumnFamilyDescriptor::new(CF_AUDIT, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_audit])?;

        let last_seq = {
            let cf = db
                .cf_handle(CF_AUDIT)
                .ok_or_else(|| LedgerError::store("Audit column family not found"))?;
            match db.iterator_cf(cf, IteratorMode::End).next() {
                Some(item) => {
                    let (key, _) = item?;
                    decode_seq(&key)?
                }
                None => 0,
            }
        };

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
            audit_seq: Arc::new(AtomicU64::new(last_seq)),
        })
    }

    fn accounts_cf(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| LedgerError::store("Accounts column family not found"))
    }

    fn audit_cf(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_AUDIT)
            .ok_or_else(|| LedgerError::store("Audit column family not found"))
    }

    fn read_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let cf = self.accounts_cf()?;
        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads the whole audit trail in write order.
    pub fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        let cf = self.audit_cf()?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_key, value) = item?;
                decode(&value)
            })
            .collect()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| LedgerError::store(format!("Serialization error: {}", e)))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LedgerError::store(format!("Deserialization error: {}", e)))
}

fn decode_seq(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| LedgerError::store("Malformed audit key"))?;
    Ok(u64::from_be_bytes(bytes))
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        self.read_account(id)
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>> {
        let cf = self.accounts_cf()?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let account: Account = decode(&value)?;
            if account.owner == owner {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    async fn insert(&self, mut account: Account) -> Result<Account> {
        let _guard = self.commit_lock.lock().await;
        if self.read_account(&account.id)?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account already exists: {}",
                account.id
            )));
        }
        account.version = 1;
        let cf = self.accounts_cf()?;
        self.db
            .put_cf(cf, account.id.as_str().as_bytes(), encode(&account)?)?;
        Ok(account)
    }

    async fn commit(&self, changes: Vec<Account>) -> Result<Vec<Account>> {
        let _guard = self.commit_lock.lock().await;

        for (i, change) in changes.iter().enumerate() {
            if changes[..i].iter().any(|c| c.id == change.id) {
                return Err(LedgerError::Validation(format!(
                    "Account {} appears twice in one commit",
                    change.id
                )));
            }
            match self.read_account(&change.id)? {
                Some(current) if current.version == change.version => {}
                Some(_) => return Err(LedgerError::Conflict(change.id.to_string())),
                None => {
                    return Err(LedgerError::NotFound(format!(
                        "Account not found: {}",
                        change.id
                    )));
                }
            }
        }

        let cf = self.accounts_cf()?;
        let mut batch = WriteBatch::default();
        let mut committed = Vec::with_capacity(changes.len());
        for mut account in changes {
            account.version += 1;
            batch.put_cf(cf, account.id.as_str().as_bytes(), encode(&account)?);
            committed.push(account);
        }
        self.db.write(batch)?;

        Ok(committed)
    }

    async fn all(&self) -> Result<Vec<Account>> {
        let cf = self.accounts_cf()?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_key, value) = item?;
                decode(&value)
            })
            .collect()
    }
}

#[async_trait]
impl AuditBackend for RocksDBStore {
    async fn write(&self, record: AuditRecord) -> Result<()> {
        let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cf = self.audit_cf()?;
        self.db.put_cf(cf, seq.to_be_bytes(), encode(&record)?)?;
        Ok(())
    }
}
