use super::audit::Origin;

/// What the transport layer hands over with every inbound action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Context for actions that don't originate from a network caller.
    pub fn internal() -> Self {
        Self::default()
    }

    pub fn from_remote(addr: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(addr.into()),
            ..Self::default()
        }
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    /// Client address: first hop of X-Forwarded-For, then X-Real-IP, then the
    /// connection address.
    pub fn client_address(&self) -> Option<String> {
        if let Some(first) = self
            .forwarded_for
            .as_deref()
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return Some(first.to_string());
        }
        if let Some(real_ip) = self.real_ip.as_deref().filter(|ip| !ip.is_empty()) {
            return Some(real_ip.to_string());
        }
        self.remote_addr.clone()
    }

    /// Identifier used to key rate-limit buckets.
    pub fn actor_id(&self) -> String {
        self.client_address()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Origin to stamp on audit events, if the caller is a network client.
    pub fn origin(&self) -> Option<Origin> {
        let address = self.client_address();
        if address.is_none() && self.user_agent.is_none() {
            return None;
        }
        Some(Origin {
            address,
            agent: self.user_agent.clone(),
        })
    }
}
