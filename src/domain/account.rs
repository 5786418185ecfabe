use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Opaque, globally unique account identifier (the bank account number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the id with everything but the last four characters hidden.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() < 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Represents a monetary balance.
///
/// This is a wrapper around `rust_decimal::Decimal` so balances and transaction
/// amounts can't be mixed up by accident.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Inclusive bounds a single transaction amount must fall within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountLimits {
    pub min: Decimal,
    pub max: Decimal,
}

impl Default for AmountLimits {
    fn default() -> Self {
        Self {
            min: dec!(0.01),
            max: dec!(50000.00),
        }
    }
}

/// A validated, strictly positive transaction amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal, limits: &AmountLimits) -> Result<Self, LedgerError> {
        if value < limits.min {
            return Err(LedgerError::Validation(format!(
                "Transaction amount must be at least {}",
                limits.min
            )));
        }
        if value > limits.max {
            return Err(LedgerError::Validation(format!(
                "Transaction amount cannot exceed {}",
                limits.max
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn authority(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Locked,
}

/// Failed login attempts that lock the account.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Ledger record for a single bank account.
///
/// Plain data: authentication concerns live in [`crate::application::auth::Principal`],
/// and the `version` field is owned by the store for optimistic concurrency.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Identifier of the owning user.
    pub owner_id: u64,
    /// Username of the owning user.
    pub owner: String,
    pub role: Role,
    pub balance: Balance,
    #[serde(
        rename = "locked",
        serialize_with = "serialize_bool",
        deserialize_with = "deserialize_bool"
    )]
    pub status: AccountStatus,
    pub failed_attempts: u32,
    /// Bumped by the store on every successful commit.
    #[serde(default)]
    pub version: u64,
}

fn serialize_bool<S>(status: &AccountStatus, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_bool(*status == AccountStatus::Locked)
}

fn deserialize_bool<'de, D>(deserializer: D) -> Result<AccountStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let locked = bool::deserialize(deserializer)?;
    if locked {
        Ok(AccountStatus::Locked)
    } else {
        Ok(AccountStatus::Active)
    }
}

impl Account {
    pub fn new(id: impl Into<AccountId>, owner_id: u64, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id,
            owner: owner.into(),
            role: Role::User,
            balance: Balance::ZERO,
            status: AccountStatus::Active,
            failed_attempts: 0,
            version: 0,
        }
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Balance::new(balance);
        self
    }

    pub fn is_locked(&self) -> bool {
        self.status == AccountStatus::Locked
    }

    /// Credits the balance.
    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
    }

    /// Debits the balance if it covers `amount`; otherwise leaves it untouched.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let requested: Balance = amount.into();
        if self.balance >= requested {
            self.balance -= requested;
            Ok(())
        } else {
            Err(LedgerError::InsufficientFunds {
                available: self.balance.value(),
                requested: requested.value(),
            })
        }
    }

    /// Counts a failed login. Returns `true` when this attempt locked the account.
    pub fn record_failed_attempt(&mut self) -> bool {
        self.failed_attempts += 1;
        if self.failed_attempts >= MAX_FAILED_ATTEMPTS && !self.is_locked() {
            self.status = AccountStatus::Locked;
            return true;
        }
        false
    }

    /// Resets the counter after a successful login. Does not unlock.
    pub fn reset_failed_attempts(&mut self) {
        self.failed_attempts = 0;
    }

    pub fn unlock(&mut self) {
        self.status = AccountStatus::Active;
        self.failed_attempts = 0;
    }
}
