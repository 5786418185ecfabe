use super::account::AccountId;
use super::request::RequestContext;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Open,
    Deposit,
    Withdrawal,
    Transfer,
    Login,
}

/// One inbound action of a batch.
///
/// Which columns matter depends on `type`: `open` uses `client`, `owner`,
/// `account` and an optional `secret`; `login` uses `owner` and `secret`; the
/// money movements use `account`, `amount` and, for transfers, `to`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Action {
    pub r#type: ActionType,
    #[serde(default)]
    pub client: Option<u64>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub account: Option<AccountId>,
    #[serde(default)]
    pub to: Option<AccountId>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Address the action came from. Actions without one are attributed to "unknown".
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl Action {
    pub fn context(&self) -> RequestContext {
        match &self.ip {
            Some(ip) => RequestContext::from_remote(ip.clone()),
            None => RequestContext::internal(),
        }
    }
}
