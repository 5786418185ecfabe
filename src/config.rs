//! Runtime configuration, loaded from a JSON file. Every field has a default so a
//! partial (or absent) file is valid.

use crate::domain::account::AmountLimits;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| LedgerError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub limits: AmountLimits,
    /// Attempts made when a commit loses a race against a concurrent writer.
    pub max_commit_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            limits: AmountLimits::default(),
            max_commit_retries: 32,
        }
    }
}

/// Capacity and refill window of one policy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPolicy {
    pub capacity: u32,
    pub refill_secs: u64,
}

impl BucketPolicy {
    pub const fn new(capacity: u32, refill_secs: u64) -> Self {
        Self {
            capacity,
            refill_secs,
        }
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub login: BucketPolicy,
    pub transaction: BucketPolicy,
    pub api: BucketPolicy,
    /// Buckets untouched for longer than this (and a full refill window) are evicted.
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: BucketPolicy::new(5, 15 * 60),
            transaction: BucketPolicy::new(20, 60),
            api: BucketPolicy::new(100, 60),
            idle_ttl_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 2,
        }
    }
}
