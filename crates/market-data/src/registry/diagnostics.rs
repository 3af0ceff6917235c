//! Per-attempt bookkeeping for orchestrated fetches.

use std::fmt;

use crate::errors::MarketDataError;
use crate::models::ProviderId;

/// Classified result of one provider call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    NotFound,
    TransientError(String),
    FatalError(String),
    /// The provider was not asked (unsupported operation or exchange).
    Skipped(String),
}

impl AttemptOutcome {
    /// Classify a provider error into an attempt outcome.
    pub fn from_error(error: &MarketDataError) -> Self {
        match error {
            MarketDataError::RateLimited { .. } => Self::RateLimited,
            MarketDataError::SymbolNotFound { .. } => Self::NotFound,
            MarketDataError::Timeout { .. } => Self::TransientError("timeout".to_string()),
            MarketDataError::Transient { cause, .. } => Self::TransientError(cause.clone()),
            MarketDataError::NotSupported { operation, .. } => {
                Self::Skipped(format!("{} not supported", operation))
            }
            MarketDataError::Fatal { cause, .. } => Self::FatalError(cause.clone()),
            other => Self::FatalError(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::RateLimited => f.write_str("RATE_LIMITED"),
            Self::NotFound => f.write_str("NOT_FOUND"),
            Self::TransientError(cause) => write!(f, "TRANSIENT ({})", cause),
            Self::FatalError(cause) => write!(f, "FATAL ({})", cause),
            Self::Skipped(reason) => write!(f, "SKIPPED ({})", reason),
        }
    }
}

/// Record of one call to one provider for one symbol candidate.
#[derive(Clone, Debug)]
pub struct FetchAttempt {
    pub candidate: String,
    pub provider_id: ProviderId,
    /// 1-based attempt number within the (candidate, provider) pair.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// Every attempt made while serving one request, in order.
#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<FetchAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        candidate: &str,
        provider_id: impl Into<ProviderId>,
        attempt: u32,
        outcome: AttemptOutcome,
    ) {
        self.attempts.push(FetchAttempt {
            candidate: candidate.to_string(),
            provider_id: provider_id.into(),
            attempt,
            outcome,
        });
    }

    pub fn record_success(&mut self, candidate: &str, provider_id: impl Into<ProviderId>, attempt: u32) {
        self.record(candidate, provider_id, attempt, AttemptOutcome::Success);
    }

    pub fn record_not_found(
        &mut self,
        candidate: &str,
        provider_id: impl Into<ProviderId>,
        attempt: u32,
    ) {
        self.record(candidate, provider_id, attempt, AttemptOutcome::NotFound);
    }

    pub fn record_skip(
        &mut self,
        candidate: &str,
        provider_id: impl Into<ProviderId>,
        reason: impl Into<String>,
    ) {
        self.record(candidate, provider_id, 0, AttemptOutcome::Skipped(reason.into()));
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no attempts".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                if a.attempt == 0 {
                    format!("{}@{}: {}", a.candidate, a.provider_id, a.outcome)
                } else {
                    format!("{}@{}#{}: {}", a.candidate, a.provider_id, a.attempt, a.outcome)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.outcome.is_success())
    }

    /// Attempts made for a given candidate, in order.
    pub fn for_candidate<'a>(&'a self, candidate: &'a str) -> impl Iterator<Item = &'a FetchAttempt> {
        self.attempts.iter().filter(move |a| a.candidate == candidate)
    }

    /// Number of real provider calls (skips excluded).
    pub fn call_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.attempt > 0).count()
    }
}
