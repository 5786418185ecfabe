use super::audit_sink::AuditSink;
use crate::domain::account::{Account, MAX_FAILED_ATTEMPTS};
use crate::domain::audit::{ActionKind, AuditEvent, Outcome};
use crate::domain::ports::{AccountStoreRef, CredentialVerifier, UnlockPolicy};
use crate::domain::request::RequestContext;
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Authentication view over an account record.
#[derive(Debug, Clone, Copy)]
pub struct Principal<'a> {
    account: &'a Account,
}

impl<'a> Principal<'a> {
    pub fn new(account: &'a Account) -> Self {
        Self { account }
    }

    pub fn username(&self) -> &str {
        &self.account.owner
    }

    pub fn is_locked(&self) -> bool {
        self.account.is_locked()
    }

    pub fn authorities(&self) -> Vec<&'static str> {
        vec![self.account.role.authority()]
    }
}

/// Fails with `AccountLocked` when the record about to be committed is locked.
fn ensure_unlocked(account: &Account) -> Result<()> {
    if Principal::new(account).is_locked() {
        return Err(LedgerError::AccountLocked);
    }
    Ok(())
}

/// Login lockout state machine.
///
/// An account locks once it has collected `MAX_FAILED_ATTEMPTS` failed logins.
/// A successful login resets the counter but never clears the lock; only an
/// [`UnlockPolicy`] can do that.
///
/// Every login ends in a versioned commit whose change re-checks the lock on the
/// record being written, so a lock set by a concurrent attempt is never
/// overwritten by a success or counted twice by a failure.
pub struct Authenticator {
    store: AccountStoreRef,
    audit: Arc<AuditSink>,
    verifier: Arc<dyn CredentialVerifier>,
    unlock: Option<Arc<dyn UnlockPolicy>>,
    max_commit_retries: u32,
}

impl Authenticator {
    pub fn new(
        store: AccountStoreRef,
        audit: Arc<AuditSink>,
        verifier: Arc<dyn CredentialVerifier>,
        max_commit_retries: u32,
    ) -> Self {
        Self {
            store,
            audit,
            verifier,
            unlock: None,
            max_commit_retries,
        }
    }

    pub fn with_unlock_policy(mut self, policy: Arc<dyn UnlockPolicy>) -> Self {
        self.unlock = Some(policy);
        self
    }

    pub async fn login(&self, ctx: &RequestContext, username: &str, secret: &str) -> Result<Account> {
        let Some(mut account) = self.store.find_by_owner(username).await? else {
            warn!(%username, "Login for unknown user");
            self.audit.record(
                ctx,
                AuditEvent::failure(username, ActionKind::Login, "User not found"),
            );
            return Err(LedgerError::InvalidCredentials);
        };

        if Principal::new(&account).is_locked() {
            account = self.try_unlock(ctx, account).await?;
        }

        let verified = match self.verifier.verify(&account, secret).await {
            Ok(verified) => verified,
            Err(e) => {
                error!(%username, error = %e, "Credential check failed");
                self.audit
                    .record(ctx, AuditEvent::failure(username, ActionKind::Login, e.to_string()));
                return Err(e);
            }
        };

        if !verified {
            return Err(self.reject(ctx, account).await);
        }

        let result = self
            .commit_with_retry(account.clone(), |acc| {
                ensure_unlocked(acc)?;
                acc.reset_failed_attempts();
                Ok(())
            })
            .await;
        let account = match result {
            Ok((account, ())) => account,
            Err(e) => return Err(self.fail(ctx, &account, e)),
        };

        info!(%username, "Login successful");
        self.audit.record(
            ctx,
            AuditEvent::action(
                Some(account.owner_id),
                account.owner.clone(),
                ActionKind::LoginSuccess,
                Outcome::Success,
                "User logged in successfully",
            ),
        );
        Ok(account)
    }

    /// Gives the unlock policy a chance; a lock that stays is audited as a
    /// blocked attempt and rejected before any credential check.
    async fn try_unlock(&self, ctx: &RequestContext, account: Account) -> Result<Account> {
        if let Some(policy) = &self.unlock
            && policy.may_unlock(&account).await?
        {
            let (account, _) = self
                .commit_with_retry(account, |acc| {
                    acc.unlock();
                    Ok(())
                })
                .await?;
            info!(username = %account.owner, "Account unlocked");
            self.audit.record(
                ctx,
                AuditEvent::action(
                    Some(account.owner_id),
                    account.owner.clone(),
                    ActionKind::AccountUnlocked,
                    Outcome::Success,
                    "Account unlocked",
                ),
            );
            return Ok(account);
        }

        Err(self.blocked(ctx, &account))
    }

    fn blocked(&self, ctx: &RequestContext, account: &Account) -> LedgerError {
        warn!(username = %account.owner, "Login attempt on locked account");
        self.audit.record(
            ctx,
            AuditEvent::action(
                Some(account.owner_id),
                account.owner.clone(),
                ActionKind::LoginAttemptLocked,
                Outcome::Blocked,
                "Login attempt on locked account",
            ),
        );
        LedgerError::AccountLocked
    }

    /// Audits a commit that did not go through. A lock discovered while
    /// committing is reported as a blocked attempt.
    fn fail(&self, ctx: &RequestContext, account: &Account, err: LedgerError) -> LedgerError {
        match err {
            LedgerError::AccountLocked => self.blocked(ctx, account),
            e => {
                error!(username = %account.owner, error = %e, "Login could not be recorded");
                self.audit.record(
                    ctx,
                    AuditEvent::failure(account.owner.clone(), ActionKind::Login, e.to_string()),
                );
                e
            }
        }
    }

    async fn reject(&self, ctx: &RequestContext, account: Account) -> LedgerError {
        let result = self
            .commit_with_retry(account.clone(), |acc| {
                ensure_unlocked(acc)?;
                Ok(acc.record_failed_attempt())
            })
            .await;
        let (account, locked) = match result {
            Ok(committed) => committed,
            Err(e) => return self.fail(ctx, &account, e),
        };

        warn!(
            username = %account.owner,
            attempts = account.failed_attempts,
            "Failed login attempt"
        );
        self.audit.record(
            ctx,
            AuditEvent::action(
                Some(account.owner_id),
                account.owner.clone(),
                ActionKind::LoginFailed,
                Outcome::Failure,
                format!("Failed login attempt. Total attempts: {}", account.failed_attempts),
            ),
        );
        if locked {
            warn!(username = %account.owner, "Account locked");
            self.audit.record(
                ctx,
                AuditEvent::action(
                    Some(account.owner_id),
                    account.owner.clone(),
                    ActionKind::AccountLocked,
                    Outcome::Success,
                    format!("Account locked after {} failed attempts", MAX_FAILED_ATTEMPTS),
                ),
            );
        }
        LedgerError::InvalidCredentials
    }

    /// Applies `change` and commits, re-running it on the latest record after a
    /// version conflict. An error from `change` aborts without writing.
    async fn commit_with_retry<T, F>(&self, mut account: Account, change: F) -> Result<(Account, T)>
    where
        F: Fn(&mut Account) -> Result<T>,
    {
        let mut conflicts = 0;
        loop {
            let mut next = account.clone();
            let outcome = change(&mut next)?;
            match self.store.commit(vec![next]).await {
                Ok(mut committed) => {
                    let committed = committed
                        .pop()
                        .ok_or_else(|| LedgerError::store("Commit returned no record"))?;
                    return Ok((committed, outcome));
                }
                Err(LedgerError::Conflict(_)) if conflicts + 1 < self.max_commit_retries => {
                    conflicts += 1;
                    account = self
                        .store
                        .get(&account.id)
                        .await?
                        .ok_or_else(|| LedgerError::NotFound(format!("Account not found: {}", account.id)))?;
                }
                Err(LedgerError::Conflict(id)) => {
                    return Err(LedgerError::store(format!(
                        "Gave up on account {} after {} conflicting commits",
                        id,
                        conflicts + 1
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit_sink::AuditWorkers;
    use crate::config::AuditConfig;
    use crate::domain::account::{AccountId, Role};
    use crate::domain::audit::AuditRecord;
    use crate::domain::ports::AccountStore;
    use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryAuditLog, InMemoryCredentials};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct Fixture {
        auth: Authenticator,
        store: InMemoryAccountStore,
        log: InMemoryAuditLog,
        workers: AuditWorkers,
    }

    impl Fixture {
        async fn new(port: Option<AccountStoreRef>, verifier: Option<Arc<dyn CredentialVerifier>>) -> Self {
            let store = InMemoryAccountStore::new();
            store.insert(Account::new("0123456780001", 1, "alice")).await.unwrap();
            let verifier = match verifier {
                Some(verifier) => verifier,
                None => {
                    let credentials = InMemoryCredentials::new();
                    credentials.register("alice", "s3cret").await;
                    Arc::new(credentials)
                }
            };
            let port: AccountStoreRef = match port {
                Some(port) => port,
                None => Arc::new(store.clone()),
            };
            let log = InMemoryAuditLog::new();
            let (sink, workers) = AuditSink::spawn(Arc::new(log.clone()), &AuditConfig::default());
            let auth = Authenticator::new(port, sink, verifier, 8);
            Self {
                auth,
                store,
                log,
                workers,
            }
        }

        async fn alice(&self) -> Account {
            self.store.find_by_owner("alice").await.unwrap().unwrap()
        }

        /// Stores alice with `attempts` failed logins already counted.
        async fn fail_alice(&self, attempts: u32) {
            let mut account = self.alice().await;
            for _ in 0..attempts {
                account.record_failed_attempt();
            }
            self.store.commit(vec![account]).await.unwrap();
        }

        async fn finish(self) -> Vec<AuditRecord> {
            drop(self.auth);
            self.workers.shutdown().await;
            self.log.records().await
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::from_remote("10.0.0.1")
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_and_valid_secret_is_then_denied() {
        let fx = Fixture::new(None, None).await;
        for _ in 0..4 {
            assert!(matches!(
                fx.auth.login(&ctx(), "alice", "wrong").await,
                Err(LedgerError::InvalidCredentials)
            ));
        }
        let account = fx.alice().await;
        assert!(!account.is_locked());
        assert_eq!(account.failed_attempts, 4);

        assert!(fx.auth.login(&ctx(), "alice", "wrong").await.is_err());
        assert!(fx.alice().await.is_locked());

        assert!(matches!(
            fx.auth.login(&ctx(), "alice", "s3cret").await,
            Err(LedgerError::AccountLocked)
        ));
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let fx = Fixture::new(None, None).await;
        fx.auth.login(&ctx(), "alice", "wrong").await.unwrap_err();
        fx.auth.login(&ctx(), "alice", "wrong").await.unwrap_err();

        let account = fx.auth.login(&ctx(), "alice", "s3cret").await.unwrap();
        assert_eq!(account.failed_attempts, 0);
        assert_eq!(fx.alice().await.failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_invalid_credentials() {
        let fx = Fixture::new(None, None).await;
        assert!(matches!(
            fx.auth.login(&ctx(), "mallory", "x").await,
            Err(LedgerError::InvalidCredentials)
        ));
    }

    /// Counts credential checks and rejects every secret.
    #[derive(Default)]
    struct CountingVerifier {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CredentialVerifier for CountingVerifier {
        async fn verify(&self, _account: &Account, _secret: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_locked_account_rejected_before_credential_check() {
        let verifier = Arc::new(CountingVerifier::default());
        let fx = Fixture::new(None, Some(verifier.clone() as Arc<dyn CredentialVerifier>)).await;
        fx.fail_alice(MAX_FAILED_ATTEMPTS).await;

        assert!(matches!(
            fx.auth.login(&ctx(), "alice", "wrong").await,
            Err(LedgerError::AccountLocked)
        ));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        let account = fx.alice().await;
        assert!(account.is_locked());
        assert_eq!(account.failed_attempts, MAX_FAILED_ATTEMPTS);

        let records = fx.finish().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.action, ActionKind::LoginAttemptLocked);
        assert_eq!(records[0].event.outcome, Outcome::Blocked);
    }

    /// Lets the wrapped store lock alice (a concurrent fifth failure) right
    /// before the first commit goes through.
    struct LockedMidLogin {
        inner: InMemoryAccountStore,
        fired: AtomicBool,
    }

    #[async_trait]
    impl AccountStore for LockedMidLogin {
        async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
            self.inner.get(id).await
        }
        async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>> {
            self.inner.find_by_owner(owner).await
        }
        async fn insert(&self, account: Account) -> Result<Account> {
            self.inner.insert(account).await
        }
        async fn commit(&self, accounts: Vec<Account>) -> Result<Vec<Account>> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let mut current = self.inner.get(&accounts[0].id).await?.unwrap();
                current.record_failed_attempt();
                self.inner.commit(vec![current]).await?;
            }
            self.inner.commit(accounts).await
        }
        async fn all(&self) -> Result<Vec<Account>> {
            self.inner.all().await
        }
    }

    #[tokio::test]
    async fn test_valid_login_loses_to_concurrent_lock() {
        let fx = Fixture::new(None, None).await;
        fx.fail_alice(MAX_FAILED_ATTEMPTS - 1).await;
        let racing = LockedMidLogin {
            inner: fx.store.clone(),
            fired: AtomicBool::new(false),
        };
        let auth = Fixture::new(Some(Arc::new(racing)), None).await.auth;

        assert!(matches!(
            auth.login(&ctx(), "alice", "s3cret").await,
            Err(LedgerError::AccountLocked)
        ));
        let account = fx.alice().await;
        assert!(account.is_locked());
        assert_eq!(account.failed_attempts, MAX_FAILED_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_failed_login_does_not_count_past_concurrent_lock() {
        let fx = Fixture::new(None, None).await;
        fx.fail_alice(MAX_FAILED_ATTEMPTS - 1).await;
        let racing = LockedMidLogin {
            inner: fx.store.clone(),
            fired: AtomicBool::new(false),
        };
        let auth = Fixture::new(Some(Arc::new(racing)), None).await.auth;

        assert!(matches!(
            auth.login(&ctx(), "alice", "wrong").await,
            Err(LedgerError::AccountLocked)
        ));
        assert_eq!(fx.alice().await.failed_attempts, MAX_FAILED_ATTEMPTS);
    }

    struct BrokenVerifier;

    #[async_trait]
    impl CredentialVerifier for BrokenVerifier {
        async fn verify(&self, _account: &Account, _secret: &str) -> Result<bool> {
            Err(LedgerError::store("credential service unreachable"))
        }
    }

    #[tokio::test]
    async fn test_verifier_failure_is_audited() {
        let fx = Fixture::new(None, Some(Arc::new(BrokenVerifier))).await;

        assert!(matches!(
            fx.auth.login(&ctx(), "alice", "s3cret").await,
            Err(LedgerError::StoreFailure(_))
        ));
        assert_eq!(fx.alice().await.failed_attempts, 0);

        let records = fx.finish().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.action, ActionKind::Login);
        assert_eq!(records[0].event.outcome, Outcome::Failure);
        assert!(records[0].event.error.as_deref().unwrap().contains("unreachable"));
    }

    struct AlwaysUnlock;

    #[async_trait]
    impl UnlockPolicy for AlwaysUnlock {
        async fn may_unlock(&self, _account: &Account) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_unlock_policy_reopens_account() {
        let fx = Fixture::new(None, None).await;
        fx.fail_alice(MAX_FAILED_ATTEMPTS).await;
        let auth = Fixture::new(Some(Arc::new(fx.store.clone())), None)
            .await
            .auth
            .with_unlock_policy(Arc::new(AlwaysUnlock));

        let account = auth.login(&ctx(), "alice", "s3cret").await.unwrap();
        assert!(!account.is_locked());
        assert_eq!(account.failed_attempts, 0);
    }

    #[test]
    fn test_principal_authorities() {
        let mut account = Account::new("0123456780001", 1, "root");
        account.role = Role::Admin;
        let principal = Principal::new(&account);
        assert_eq!(principal.authorities(), vec!["ROLE_ADMIN"]);
        assert_eq!(principal.username(), "root");
        assert!(!principal.is_locked());
    }
}
