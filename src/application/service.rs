use super::admission::AdmissionGate;
use super::auth::Authenticator;
use super::engine::{LedgerEngine, Transfer};
use super::rate_limiter::PolicyClass;
use crate::domain::account::{Account, AccountId, Balance};
use crate::domain::audit::ActionKind;
use crate::domain::request::RequestContext;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;

/// What upstream callers talk to. Every action passes the admission gate before
/// it reaches the engine or the authenticator.
pub struct Bank {
    gate: AdmissionGate,
    engine: LedgerEngine,
    auth: Authenticator,
}

impl Bank {
    pub fn new(gate: AdmissionGate, engine: LedgerEngine, auth: Authenticator) -> Self {
        Self { gate, engine, auth }
    }

    pub async fn open_account(&self, ctx: &RequestContext, account: Account) -> Result<Account> {
        self.gate.admit(ctx, PolicyClass::Api)?;
        self.engine.open_account(ctx, account).await
    }

    pub async fn balance(&self, ctx: &RequestContext, id: &AccountId) -> Result<Balance> {
        self.gate.admit(ctx, PolicyClass::Api)?;
        self.engine.balance(id).await
    }

    pub async fn deposit(&self, ctx: &RequestContext, id: &AccountId, amount: Decimal) -> Result<Account> {
        self.gate.admit(ctx, PolicyClass::Transaction)?;
        self.engine.deposit(ctx, id, amount).await
    }

    pub async fn withdraw(&self, ctx: &RequestContext, id: &AccountId, amount: Decimal) -> Result<Account> {
        self.gate.admit(ctx, PolicyClass::Transaction)?;
        self.engine.withdraw(ctx, id, amount).await
    }

    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> Result<Transfer> {
        self.gate.admit(ctx, PolicyClass::Transaction)?;
        self.engine.transfer(ctx, from, to, amount).await
    }

    /// Records a malformed `action` for `subject` without touching the ledger.
    pub fn reject(&self, ctx: &RequestContext, subject: &str, action: ActionKind, err: LedgerError) -> LedgerError {
        self.engine.reject(ctx, subject, action, err)
    }

    /// Authenticates `username`. A successful login clears the caller's login
    /// bucket.
    pub async fn login(&self, ctx: &RequestContext, username: &str, secret: &str) -> Result<Account> {
        self.gate.admit(ctx, PolicyClass::Login)?;
        let account = self.auth.login(ctx, username, secret).await?;
        self.gate.release(ctx, PolicyClass::Login);
        Ok(account)
    }
}
