//! Application layer containing the business logic orchestration.
//!
//! [`service::Bank`] is the entry point: it runs each action through the
//! [`admission::AdmissionGate`] and then hands it to the [`engine::LedgerEngine`]
//! or the [`auth::Authenticator`]. Outcomes are recorded through the
//! fire-and-forget [`audit_sink::AuditSink`].

pub mod admission;
pub mod audit_sink;
pub mod auth;
pub mod engine;
pub mod rate_limiter;
pub mod service;
