use super::rate_limiter::{Decision, PolicyClass, RateLimiter};
use crate::domain::request::RequestContext;
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Admits or rejects inbound actions before any business logic runs.
#[derive(Clone)]
pub struct AdmissionGate {
    limiter: Arc<RateLimiter>,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Spends one token of the caller's `class` bucket. A rejection carries the
    /// advisory retry-after; it is never retried here.
    pub fn admit(&self, ctx: &RequestContext, class: PolicyClass) -> Result<Decision> {
        let actor = ctx.actor_id();
        let decision = self.limiter.consume(&actor, class);
        if decision.admitted {
            debug!(%actor, %class, remaining = decision.remaining_tokens, "Request admitted");
            Ok(decision)
        } else {
            warn!(%actor, %class, retry_after = decision.retry_after_secs, "Rate limit exceeded");
            Err(LedgerError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    /// Resets the caller's bucket after it succeeded at the gated action.
    pub fn release(&self, ctx: &RequestContext, class: PolicyClass) {
        self.limiter.clear_limit(&ctx.actor_id(), class);
    }
}
