use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Insufficient funds. Available: {available}, Requested: {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
    #[error("Too many requests. Please try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },
    #[error("Account is locked")]
    AccountLocked,
    #[error("Invalid username or password")]
    InvalidCredentials,
    /// A commit lost an optimistic-concurrency race. Retried by the engine.
    #[error("Concurrent modification of account {0}")]
    Conflict(String),
    #[error("Store failure: {0}")]
    StoreFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StoreFailure(Box::new(err))
    }
}

impl LedgerError {
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::StoreFailure(err.into())
    }

    /// Message safe to show to an end user. Faults never leak internal detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::InsufficientFunds { .. }
            | Self::RateLimited { .. }
            | Self::AccountLocked
            | Self::InvalidCredentials => self.to_string(),
            Self::Conflict(_)
            | Self::StoreFailure(_)
            | Self::Config(_)
            | Self::Csv(_)
            | Self::Io(_) => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }
}
