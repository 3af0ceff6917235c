//! Retrieval orchestrator: cache, resolution plan, rate gate, retries.
//!
//! Every public operation runs the same state machine:
//!
//! ```text
//!   CacheCheck ──hit──► return
//!       │ miss
//!       ▼
//!   PlanResolution ──► [(candidate, [provider, ...]), ...]
//!       │
//!       ▼
//!   CandidateLoop (candidate-major, providers by priority)
//!       │  acquire ─► fetch ─► classify
//!       │    Success        ─► cache write-through ─► return
//!       │    NotFound/Skip  ─► next pair
//!       │    RateLimited    ─► next provider, or back off and retry
//!       │    Transient      ─► back off and retry (bounded)
//!       │    Fatal          ─► abort
//!       ▼
//!   Exhaustion ──► NoDataAvailable { diagnostics }
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use super::diagnostics::{AttemptOutcome, FetchDiagnostics};
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::retry::RetryPolicy;
use crate::cache::{CacheKey, CacheTtls, ResultCache};
use crate::clock::{Sleeper, TokioSleeper};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{
    DataCategory, EconomicSeries, EquityQuery, Payload, ProviderId, ProviderRequest,
    SearchResult, SeriesQuery, StockRequest,
};
use crate::provider::MarketDataProvider;
use crate::resolver::SymbolResolver;

/// Largest page a search may request.
pub const MAX_SEARCH_LIMIT: usize = 50;

/// One candidate and the provider calls that may serve it, in priority order.
struct PlanStep {
    candidate: String,
    calls: Vec<(Arc<dyn MarketDataProvider>, ProviderRequest)>,
}

/// Coordinates providers for every data request.
pub struct RetrievalOrchestrator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    resolver: SymbolResolver,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResultCache>,
    ttls: CacheTtls,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetrievalOrchestrator {
    /// Create an orchestrator over the given providers.
    ///
    /// Providers are ordered by priority. Each provider's declared rate limit
    /// seeds the limiter unless limits were already configured for it.
    pub fn new(
        mut providers: Vec<Arc<dyn MarketDataProvider>>,
        resolver: SymbolResolver,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResultCache>,
    ) -> Self {
        providers.sort_by_key(|p| p.priority());

        for provider in &providers {
            let id: ProviderId = Cow::Borrowed(provider.id());
            rate_limiter.configure_if_absent(&id, RateLimitConfig::from(provider.rate_limit()));
        }

        Self {
            providers,
            resolver,
            rate_limiter,
            cache,
            ttls: CacheTtls::default(),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the delay primitive (tests pass a `ManualClock`).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Registered provider ids, in priority order.
    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Quote, history or fundamentals for a (possibly bare) equity symbol.
    pub async fn fetch_stock_datum(&self, request: &StockRequest) -> Result<Payload, MarketDataError> {
        request.query.validate(Utc::now().date_naive())?;

        let key = stock_cache_key(request);
        if let Some(payload) = self.cache.get(&key) {
            return Ok(payload);
        }

        let plan = self.resolver.resolve_plan(&request.symbol)?;
        let category = request.query.category();
        let providers = self.eligible_providers(category, request.provider.as_deref())?;

        let mut diagnostics = FetchDiagnostics::new();
        let mut steps = Vec::with_capacity(plan.len());
        for candidate in &plan {
            let mut calls = Vec::new();
            for provider in &providers {
                match provider.provider_symbol(candidate) {
                    Some(symbol) => calls.push((
                        Arc::clone(provider),
                        ProviderRequest::for_equity(symbol, &request.query),
                    )),
                    None => {
                        diagnostics.record_skip(&candidate.symbol, provider.id(), "exchange not covered")
                    }
                }
            }
            steps.push(PlanStep {
                candidate: candidate.symbol.clone(),
                calls,
            });
        }

        self.run_plan(&key, steps, diagnostics).await
    }

    /// Free-text symbol search, primary-exchange listings first.
    pub async fn search_symbols(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, MarketDataError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MarketDataError::InvalidInput(
                "Search query must not be empty".to_string(),
            ));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

        let key = CacheKey::new(
            "search",
            [("query", query.to_string()), ("limit", limit.to_string())],
        );

        let payload = match self.cache.get(&key) {
            Some(payload) => payload,
            None => {
                let providers = self.eligible_providers(DataCategory::Search, None)?;
                let step = PlanStep {
                    candidate: query.to_string(),
                    calls: providers
                        .into_iter()
                        .map(|p| {
                            let call = ProviderRequest::Search {
                                query: query.to_string(),
                                limit,
                            };
                            (p, call)
                        })
                        .collect(),
                };
                self.run_plan(&key, vec![step], FetchDiagnostics::new())
                    .await?
            }
        };

        match payload {
            Payload::Search(results) => {
                let mut results = self.resolver.prioritize(results);
                results.truncate(limit);
                Ok(results)
            }
            other => Err(unexpected_payload("search", &other)),
        }
    }

    /// Observations and metadata for a macro-economic series.
    pub async fn fetch_series(&self, query: &SeriesQuery) -> Result<EconomicSeries, MarketDataError> {
        let series_id = query.series_id.trim().to_ascii_uppercase();
        if series_id.is_empty() {
            return Err(MarketDataError::InvalidInput(
                "Series id must not be empty".to_string(),
            ));
        }
        let query = SeriesQuery {
            series_id: series_id.clone(),
            ..query.clone()
        };

        let mut params = vec![("series_id", series_id.clone())];
        if let Some(start) = query.observation_start {
            params.push(("observation_start", start.to_string()));
        }
        if let Some(end) = query.observation_end {
            params.push(("observation_end", end.to_string()));
        }
        let key = CacheKey::new("economic_series", params);

        let payload = match self.cache.get(&key) {
            Some(payload) => payload,
            None => {
                let providers = self.eligible_providers(DataCategory::Macro, None)?;
                let step = PlanStep {
                    candidate: series_id,
                    calls: providers
                        .into_iter()
                        .map(|p| (p, ProviderRequest::Series(query.clone())))
                        .collect(),
                };
                self.run_plan(&key, vec![step], FetchDiagnostics::new())
                    .await?
            }
        };

        match payload {
            Payload::Series(series) => Ok(series),
            other => Err(unexpected_payload("series", &other)),
        }
    }

    // ========================================================================
    // State machine
    // ========================================================================

    /// Providers able to serve `category`, optionally restricted to one id.
    fn eligible_providers(
        &self,
        category: DataCategory,
        requested: Option<&str>,
    ) -> Result<Vec<Arc<dyn MarketDataProvider>>, MarketDataError> {
        let providers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.capabilities().supports(category))
            .filter(|p| requested.map_or(true, |id| p.id().eq_ignore_ascii_case(id)))
            .cloned()
            .collect();

        if providers.is_empty() {
            warn!(
                "No providers available for {} (requested: {:?})",
                category.as_str(),
                requested
            );
            return Err(MarketDataError::NoProvidersAvailable);
        }
        Ok(providers)
    }

    async fn run_plan(
        &self,
        key: &CacheKey,
        steps: Vec<PlanStep>,
        mut diagnostics: FetchDiagnostics,
    ) -> Result<Payload, MarketDataError> {
        for step in &steps {
            for (index, (provider, call)) in step.calls.iter().enumerate() {
                let has_alternative = index + 1 < step.calls.len();

                if let Some(payload) = self
                    .attempt_pair(&step.candidate, provider, call, has_alternative, &mut diagnostics)
                    .await?
                {
                    let ttl = self.ttls.ttl_for(payload.category());
                    self.cache.put(key.clone(), payload.clone(), ttl);
                    return Ok(payload);
                }
            }
        }

        warn!("No data for {}: {}", key, diagnostics.summary());
        Err(MarketDataError::NoDataAvailable { diagnostics })
    }

    /// Drive one (candidate, provider) pair to a conclusion.
    ///
    /// `Ok(Some)` is a success, `Ok(None)` means move on to the next pair,
    /// `Err` aborts the whole plan.
    async fn attempt_pair(
        &self,
        candidate: &str,
        provider: &Arc<dyn MarketDataProvider>,
        call: &ProviderRequest,
        has_alternative: bool,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<Option<Payload>, MarketDataError> {
        let provider_id: ProviderId = Cow::Borrowed(provider.id());
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let cost = provider.request_cost(call);
            let result = match self.rate_limiter.acquire_many(&provider_id, cost) {
                Ok(_permit) => {
                    debug!(
                        "Calling '{}' for {} (attempt {})",
                        provider_id, candidate, attempt
                    );
                    provider.fetch(call).await
                }
                Err(throttled) => Err(throttled),
            };

            let error = match result {
                Ok(payload) => {
                    diagnostics.record_success(candidate, provider_id.clone(), attempt);
                    info!(
                        "Fetched {} for {} from '{}'",
                        payload.category().as_str(),
                        candidate,
                        provider_id
                    );
                    return Ok(Some(payload));
                }
                Err(error) => error,
            };

            diagnostics.record(
                candidate,
                provider_id.clone(),
                attempt,
                AttemptOutcome::from_error(&error),
            );

            match error.retry_class() {
                RetryClass::Never => {
                    warn!(
                        "Terminal error from '{}' for {}: {}, aborting",
                        provider_id, candidate, error
                    );
                    return Err(error);
                }
                RetryClass::NextCandidate | RetryClass::Skip => {
                    debug!("'{}' cannot serve {}: {}", provider_id, candidate, error);
                    return Ok(None);
                }
                RetryClass::Throttled => {
                    if has_alternative {
                        info!(
                            "'{}' is rate limited, trying next provider for {}",
                            provider_id, candidate
                        );
                        return Ok(None);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            "'{}' still rate limited after {} attempts for {}",
                            provider_id, attempt, candidate
                        );
                        return Ok(None);
                    }
                    let retry_after = match &error {
                        MarketDataError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let delay = self
                        .retry
                        .backoff(attempt)
                        .max(retry_after.unwrap_or_default());
                    debug!("Waiting {:?} for '{}' rate limit", delay, provider_id);
                    self.sleeper.sleep(delay).await;
                }
                RetryClass::WithBackoff => {
                    if attempt >= max_attempts {
                        warn!(
                            "Giving up on '{}' for {} after {} attempts: {}",
                            provider_id, candidate, attempt, error
                        );
                        return Ok(None);
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        "Retrying '{}' for {} in {:?} after: {}",
                        provider_id, candidate, delay, error
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}

fn stock_cache_key(request: &StockRequest) -> CacheKey {
    let mut params = vec![("symbol", request.symbol.clone())];
    if let EquityQuery::History { range, interval } = &request.query {
        params.push(("period", range.to_string()));
        params.push(("interval", interval.to_string()));
    }
    if let Some(provider) = &request.provider {
        params.push(("source", provider.to_ascii_uppercase()));
    }
    CacheKey::new(request.query.tool_name(), params)
}

fn unexpected_payload(operation: &str, payload: &Payload) -> MarketDataError {
    MarketDataError::fatal(
        "ORCHESTRATOR",
        format!(
            "{} returned a {} payload",
            operation,
            payload.category().as_str()
        ),
    )
}
