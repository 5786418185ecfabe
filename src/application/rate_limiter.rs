use crate::config::{BucketPolicy, RateLimitConfig};
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyClass {
    Login,
    Transaction,
    Api,
}

impl PolicyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::Login => "login",
            PolicyClass::Transaction => "transaction",
            PolicyClass::Api => "api",
        }
    }
}

impl fmt::Display for PolicyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buckets are per actor and per class, so exhausting one class never affects another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub actor: String,
    pub class: PolicyClass,
}

impl BucketKey {
    pub fn new(actor: impl Into<String>, class: PolicyClass) -> Self {
        Self {
            actor: actor.into(),
            class,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor, self.class)
    }
}

/// Outcome of a single `consume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    pub remaining_tokens: u32,
    /// Whole seconds until the next refill; zero when admitted.
    pub retry_after_secs: u64,
}

/// Interval-refill token bucket: the whole capacity comes back at each window
/// boundary.
#[derive(Debug, Clone)]
struct Bucket {
    capacity: u32,
    tokens: u32,
    refill_interval: Duration,
    last_refill: Instant,
    last_access: Instant,
}

impl Bucket {
    fn new(policy: BucketPolicy, now: Instant) -> Self {
        Self {
            capacity: policy.capacity,
            tokens: policy.capacity,
            refill_interval: policy.refill_interval(),
            last_refill: now,
            last_access: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if self.refill_interval.is_zero() {
            self.tokens = self.capacity;
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed >= self.refill_interval {
            // Stay aligned to the window grid rather than restarting at `now`.
            let into_window = elapsed.as_nanos() % self.refill_interval.as_nanos();
            self.last_refill = now - Duration::from_nanos(into_window as u64);
            self.tokens = self.capacity;
        }
    }

    fn try_consume(&mut self, now: Instant) -> Decision {
        self.refill(now);
        self.last_access = now;

        if self.tokens >= 1 {
            self.tokens -= 1;
            Decision {
                admitted: true,
                remaining_tokens: self.tokens,
                retry_after_secs: 0,
            }
        } else {
            let next_refill = self.last_refill + self.refill_interval;
            let wait = next_refill.saturating_duration_since(now);
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            Decision {
                admitted: false,
                remaining_tokens: 0,
                retry_after_secs: secs.max(1),
            }
        }
    }

    /// An idle bucket past its refill window would be full again, so dropping it
    /// is indistinguishable from keeping it.
    fn is_expired(&self, now: Instant, idle_ttl: Duration) -> bool {
        let idle = now.saturating_duration_since(self.last_access);
        idle >= idle_ttl.max(self.refill_interval)
    }
}

/// Owns the token buckets of every actor.
pub struct RateLimiter {
    buckets: DashMap<BucketKey, Bucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn policy(&self, class: PolicyClass) -> BucketPolicy {
        match class {
            PolicyClass::Login => self.config.login,
            PolicyClass::Transaction => self.config.transaction,
            PolicyClass::Api => self.config.api,
        }
    }

    /// Takes one token from the actor's bucket for `class`, creating it on first use.
    ///
    /// The map entry stays locked for the whole find-refill-decrement step, so
    /// concurrent callers on the same key can't both spend the last token.
    pub fn consume(&self, actor: &str, class: PolicyClass) -> Decision {
        let now = Instant::now();
        let policy = self.policy(class);
        let mut bucket = self
            .buckets
            .entry(BucketKey::new(actor, class))
            .or_insert_with(|| Bucket::new(policy, now));
        bucket.try_consume(now)
    }

    /// Forgets the bucket, so the next `consume` starts from full capacity.
    pub fn clear_limit(&self, actor: &str, class: PolicyClass) {
        self.buckets.remove(&BucketKey::new(actor, class));
    }

    /// Removes buckets that have been idle past their expiry. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = Duration::from_secs(self.config.idle_ttl_secs);
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now, ttl));
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, "Evicted idle rate-limit buckets");
        }
        evicted
    }

    /// Runs [`evict_idle`](Self::evict_idle) every `period` until the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.evict_idle();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
