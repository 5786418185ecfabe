use super::audit_sink::AuditSink;
use crate::config::LedgerConfig;
use crate::domain::account::{Account, AccountId, Amount, Balance};
use crate::domain::audit::{ActionKind, AuditEvent, Outcome};
use crate::domain::ports::AccountStoreRef;
use crate::domain::request::RequestContext;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Both sides of a committed transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub sender: Account,
    pub receiver: Account,
}

/// The funds-movement engine.
///
/// `LedgerEngine` validates amounts, enforces the non-negative balance rule and
/// commits through the store's compare-and-swap `commit`. A commit that loses a
/// race is recomputed against the fresh record; business rejections are never
/// retried. Every outcome is handed to the [`AuditSink`] without waiting for it.
pub struct LedgerEngine {
    store: AccountStoreRef,
    audit: Arc<AuditSink>,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Creates a new `LedgerEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The store holding account records.
    /// * `audit` - Where audit events are sent.
    /// * `config` - Amount limits and the commit retry budget.
    pub fn new(store: AccountStoreRef, audit: Arc<AuditSink>, config: LedgerConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Registers a new account with its opening balance.
    pub async fn open_account(&self, ctx: &RequestContext, account: Account) -> Result<Account> {
        if account.balance < Balance::ZERO {
            let err = LedgerError::Validation("Opening balance cannot be negative".to_string());
            self.audit.record(
                ctx,
                AuditEvent::failure(account.owner.clone(), ActionKind::AccountCreation, err.to_string()),
            );
            return Err(err);
        }
        match self.store.insert(account.clone()).await {
            Ok(opened) => {
                info!(account = %opened.id, owner = %opened.owner, "Account opened");
                self.audit.record(
                    ctx,
                    AuditEvent::action(
                        Some(opened.owner_id),
                        opened.owner.clone(),
                        ActionKind::AccountCreation,
                        Outcome::Success,
                        format!("New account opened: {}", opened.id.masked()),
                    ),
                );
                Ok(opened)
            }
            Err(e) => {
                self.audit.record(
                    ctx,
                    AuditEvent::failure(account.owner, ActionKind::AccountCreation, e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Audits an action turned away before it reached the ledger and hands
    /// the error back.
    pub fn reject(&self, ctx: &RequestContext, subject: &str, action: ActionKind, err: LedgerError) -> LedgerError {
        warn!(%subject, %action, error = %err, "Action rejected");
        self.audit
            .record(ctx, AuditEvent::failure(subject, action, err.to_string()));
        err
    }

    pub async fn balance(&self, id: &AccountId) -> Result<Balance> {
        self.store
            .get(id)
            .await?
            .map(|account| account.balance)
            .ok_or_else(|| LedgerError::NotFound(format!("Account not found: {}", id)))
    }

    pub async fn deposit(&self, ctx: &RequestContext, id: &AccountId, amount: Decimal) -> Result<Account> {
        info!(account = %id, %amount, "Processing deposit");
        let amount = self.validate(ctx, id.as_str(), ActionKind::Deposit, amount)?;
        let account = self.load(ctx, id, ActionKind::Deposit, "Account").await?;

        let result = self
            .update(account.clone(), |acc| {
                acc.credit(amount);
                Ok(())
            })
            .await;

        match result {
            Ok(committed) => {
                info!(account = %id, balance = %committed.balance, "Deposit successful");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &committed,
                        ActionKind::Deposit,
                        amount.value(),
                        Outcome::Success,
                        format!("Deposit successful. New balance: {}", committed.balance),
                    ),
                );
                Ok(committed)
            }
            Err(e) => {
                warn!(account = %id, error = %e, "Deposit failed");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &account,
                        ActionKind::Deposit,
                        amount.value(),
                        Outcome::Failure,
                        format!("Deposit failed: {}", e),
                    )
                    .with_error(e.to_string()),
                );
                Err(e)
            }
        }
    }

    pub async fn withdraw(&self, ctx: &RequestContext, id: &AccountId, amount: Decimal) -> Result<Account> {
        info!(account = %id, %amount, "Processing withdrawal");
        let amount = self.validate(ctx, id.as_str(), ActionKind::Withdrawal, amount)?;
        let account = self.load(ctx, id, ActionKind::Withdrawal, "Account").await?;

        let result = self.update(account.clone(), |acc| acc.debit(amount)).await;

        match result {
            Ok(committed) => {
                info!(account = %id, balance = %committed.balance, "Withdrawal successful");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &committed,
                        ActionKind::Withdrawal,
                        amount.value(),
                        Outcome::Success,
                        format!("Withdrawal successful. New balance: {}", committed.balance),
                    ),
                );
                Ok(committed)
            }
            Err(LedgerError::InsufficientFunds {
                available,
                requested,
            }) => {
                warn!(account = %id, %available, %requested, "Insufficient funds");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &account,
                        ActionKind::Withdrawal,
                        amount.value(),
                        Outcome::Failure,
                        format!("Insufficient funds. Balance: {}", Balance::new(available)),
                    ),
                );
                Err(LedgerError::InsufficientFunds {
                    available,
                    requested,
                })
            }
            Err(e) => {
                warn!(account = %id, error = %e, "Withdrawal failed");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &account,
                        ActionKind::Withdrawal,
                        amount.value(),
                        Outcome::Failure,
                        format!("Withdrawal failed: {}", e),
                    )
                    .with_error(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Both accounts are checked before anything is mutated, and the debit and
    /// credit are committed together: either both records change or neither does.
    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> Result<Transfer> {
        info!(%from, %to, %amount, "Processing transfer");
        let amount = self.validate(ctx, from.as_str(), ActionKind::TransferSend, amount)?;
        if from == to {
            let err = LedgerError::Validation("Cannot transfer to the same account".to_string());
            self.audit.record(
                ctx,
                AuditEvent::failure(from.as_str(), ActionKind::TransferSend, err.to_string()),
            );
            return Err(err);
        }

        let sender = self.load(ctx, from, ActionKind::TransferSend, "Sender account").await?;
        let receiver = self.load(ctx, to, ActionKind::TransferSend, "Receiver account").await?;

        match self.move_funds(sender.clone(), receiver, amount).await {
            Ok(transfer) => {
                info!(%from, %to, %amount, "Transfer successful");
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &transfer.sender,
                        ActionKind::TransferSend,
                        amount.value(),
                        Outcome::Success,
                        format!("Transfer to {} successful", to),
                    ),
                );
                self.audit.record(
                    ctx,
                    AuditEvent::transaction(
                        &transfer.receiver,
                        ActionKind::TransferReceive,
                        amount.value(),
                        Outcome::Success,
                        format!("Transfer from {} received", from),
                    ),
                );
                Ok(transfer)
            }
            Err(e) => {
                warn!(%from, %to, error = %e, "Transfer failed");
                let mut event = AuditEvent::transaction(
                    &sender,
                    ActionKind::TransferSend,
                    amount.value(),
                    Outcome::Failure,
                    format!("Transfer failed: {}", e),
                );
                if !matches!(e, LedgerError::InsufficientFunds { .. }) {
                    event = event.with_error(e.to_string());
                }
                self.audit.record(ctx, event);
                Err(e)
            }
        }
    }

    fn validate(&self, ctx: &RequestContext, subject: &str, action: ActionKind, amount: Decimal) -> Result<Amount> {
        Amount::new(amount, &self.config.limits).inspect_err(|e| {
            warn!(%subject, %action, error = %e, "Rejected amount");
            self.audit
                .record(ctx, AuditEvent::failure(subject, action, e.to_string()));
        })
    }

    /// Fetches an account, auditing the failure when it is missing or unreadable.
    async fn load(&self, ctx: &RequestContext, id: &AccountId, action: ActionKind, side: &str) -> Result<Account> {
        let result = match self.store.get(id).await {
            Ok(Some(account)) => Ok(account),
            Ok(None) => Err(LedgerError::NotFound(format!("{} not found: {}", side, id))),
            Err(e) => Err(e),
        };
        result.inspect_err(|e| {
            warn!(account = %id, %action, error = %e, "Account lookup failed");
            self.audit
                .record(ctx, AuditEvent::failure(id.as_str(), action, e.to_string()));
        })
    }

    /// Applies `change` to `account` and commits, recomputing on the latest
    /// record whenever another writer got there first.
    async fn update<F>(&self, mut account: Account, change: F) -> Result<Account>
    where
        F: Fn(&mut Account) -> Result<()>,
    {
        let mut conflicts = 0;
        loop {
            let mut next = account.clone();
            change(&mut next)?;
            match self.store.commit(vec![next]).await {
                Ok(mut committed) => {
                    return committed
                        .pop()
                        .ok_or_else(|| LedgerError::store("Commit returned no record"));
                }
                Err(LedgerError::Conflict(_)) => {
                    conflicts += 1;
                    self.check_retry_budget(conflicts, &account.id)?;
                    account = self.reload(&account.id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn move_funds(&self, mut sender: Account, mut receiver: Account, amount: Amount) -> Result<Transfer> {
        let mut conflicts = 0;
        loop {
            let mut debited = sender.clone();
            let mut credited = receiver.clone();
            debited.debit(amount)?;
            credited.credit(amount);

            match self.store.commit(vec![debited, credited]).await {
                Ok(committed) => {
                    let mut committed = committed.into_iter();
                    return match (committed.next(), committed.next()) {
                        (Some(sender), Some(receiver)) => Ok(Transfer { sender, receiver }),
                        _ => Err(LedgerError::store("Commit returned fewer records than written")),
                    };
                }
                Err(LedgerError::Conflict(id)) => {
                    conflicts += 1;
                    self.check_retry_budget(conflicts, &sender.id)?;
                    warn!(account = %id, attempt = conflicts, "Transfer commit conflicted, retrying");
                    sender = self.reload(&sender.id).await?;
                    receiver = self.reload(&receiver.id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_retry_budget(&self, conflicts: u32, id: &AccountId) -> Result<()> {
        if conflicts >= self.config.max_commit_retries {
            return Err(LedgerError::store(format!(
                "Gave up on account {} after {} conflicting commits",
                id, conflicts
            )));
        }
        Ok(())
    }

    async fn reload(&self, id: &AccountId) -> Result<Account> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Account not found: {}", id)))
    }
}
