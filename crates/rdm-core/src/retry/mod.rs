//! Retry and backoff policy.
//!
//! This module encapsulates error classification (Transient, Permanent,
//! Unknown) and exponential backoff decisions so the orchestrator applies one
//! consistent policy.

mod classify;
mod policy;

pub use classify::{classify, classify_http_status, classify_transport, ErrorClass};
pub use policy::{RetryDecision, RetryPolicy};
