//! Provider orchestration module.
//!
//! This module coordinates market data providers, including:
//! - Priority ordering and capability filtering
//! - Rate limiting per provider
//! - Retry with exponential backoff
//! - Per-attempt diagnostics

mod diagnostics;
mod orchestrator;
mod rate_limiter;
mod retry;

pub use diagnostics::{AttemptOutcome, FetchAttempt, FetchDiagnostics};
pub use orchestrator::{RetrievalOrchestrator, MAX_SEARCH_LIMIT};
pub use rate_limiter::{Permit, RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
