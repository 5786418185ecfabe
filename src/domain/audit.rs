use super::account::{Account, AccountId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    Blocked,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Deposit,
    Withdrawal,
    TransferSend,
    TransferReceive,
    Login,
    LoginSuccess,
    LoginFailed,
    LoginAttemptLocked,
    AccountLocked,
    AccountUnlocked,
    AccountCreation,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Deposit => "DEPOSIT",
            ActionKind::Withdrawal => "WITHDRAWAL",
            ActionKind::TransferSend => "TRANSFER_SEND",
            ActionKind::TransferReceive => "TRANSFER_RECEIVE",
            ActionKind::Login => "LOGIN",
            ActionKind::LoginSuccess => "LOGIN_SUCCESS",
            ActionKind::LoginFailed => "LOGIN_FAILED",
            ActionKind::LoginAttemptLocked => "LOGIN_ATTEMPT_LOCKED",
            ActionKind::AccountLocked => "ACCOUNT_LOCKED",
            ActionKind::AccountUnlocked => "ACCOUNT_UNLOCKED",
            ActionKind::AccountCreation => "ACCOUNT_CREATION",
        };
        f.write_str(name)
    }
}

/// Network origin of the caller an event is attributed to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct Origin {
    pub address: Option<String>,
    pub agent: Option<String>,
}

/// One entry of the audit trail, as produced by the caller.
///
/// The three constructors cover the shapes the trail records: a generic action,
/// a financial transaction (adds account and amount) and a bare failure (adds
/// only the error detail).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<u64>,
    pub actor_name: String,
    pub action: ActionKind,
    pub account: Option<AccountId>,
    pub amount: Option<Decimal>,
    pub outcome: Outcome,
    pub details: String,
    pub error: Option<String>,
    pub origin_address: Option<String>,
    pub origin_agent: Option<String>,
}

impl AuditEvent {
    pub fn action(
        actor_id: Option<u64>,
        actor_name: impl Into<String>,
        action: ActionKind,
        outcome: Outcome,
        details: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            actor_name: actor_name.into(),
            action,
            account: None,
            amount: None,
            outcome,
            details: details.into(),
            error: None,
            origin_address: None,
            origin_agent: None,
        }
    }

    /// A financial event attributed to the owner of `account`.
    pub fn transaction(
        account: &Account,
        action: ActionKind,
        amount: Decimal,
        outcome: Outcome,
        details: impl Into<String>,
    ) -> Self {
        Self {
            account: Some(account.id.clone()),
            amount: Some(amount),
            ..Self::action(
                Some(account.owner_id),
                account.owner.clone(),
                action,
                outcome,
                details,
            )
        }
    }

    pub fn failure(actor_name: impl Into<String>, action: ActionKind, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::action(None, actor_name, action, Outcome::Failure, "")
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_origin(mut self, origin: Option<&Origin>) -> Self {
        if let Some(origin) = origin {
            self.origin_address = origin.address.clone();
            self.origin_agent = origin.agent.clone();
        }
        self
    }
}

/// A persisted audit event. Id and timestamp are assigned when it is written.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn stamp(event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}
