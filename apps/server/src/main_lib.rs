use std::borrow::Cow;
use std::sync::Arc;

use financemcp_market_data::{
    AlphaVantageProvider, FredProvider, MarketDataProvider, RateLimitConfig, RateLimiter,
    ResultCache, RetrievalOrchestrator, SymbolResolver, YahooProvider,
};
use reqwest::Client;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::auth::{AuthGate, ProtectedResourceMetadata};
use crate::config::{Config, RateLimitOverride};

pub struct AppState {
    pub orchestrator: Arc<RetrievalOrchestrator>,
    pub auth: Arc<AuthGate>,
    pub metadata: ProtectedResourceMetadata,
    pub server_name: String,
}

pub fn init_tracing() {
    let fmt_layer = fmt::layer().json().with_current_span(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let providers = build_providers(config)?;
    info!(
        "Market data providers: {}",
        providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(", ")
    );

    let rate_limiter = Arc::new(RateLimiter::new());
    apply_rate_limit_overrides(&rate_limiter, &providers, &config.rate_limits);

    let orchestrator = RetrievalOrchestrator::new(
        providers,
        SymbolResolver::new(config.primary_exchange, config.secondary_exchange),
        rate_limiter,
        Arc::new(ResultCache::new()),
    )
    .with_ttls(config.cache_ttls.clone())
    .with_retry_policy(config.retry.clone());

    let client = Client::builder().timeout(config.provider_timeout).build()?;
    let auth = AuthGate::from_config(client, &config.auth, config.resource.metadata_url.clone());
    info!(
        "Auth gate using {} for audience '{}'",
        if config.auth.introspection.is_some() {
            "token introspection"
        } else {
            "JWKS validation"
        },
        config.auth.audience
    );

    Ok(Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        auth: Arc::new(auth),
        metadata: ProtectedResourceMetadata::new(&config.resource, &config.auth.audience),
        server_name: config.server_name.clone(),
    }))
}

/// Yahoo is always available; keyed providers only when their key is set.
fn build_providers(config: &Config) -> anyhow::Result<Vec<Arc<dyn MarketDataProvider>>> {
    let mut providers: Vec<Arc<dyn MarketDataProvider>> =
        vec![Arc::new(YahooProvider::new(config.provider_timeout)?)];

    match &config.alpha_vantage_api_key {
        Some(key) => providers.push(Arc::new(AlphaVantageProvider::new(
            key.clone(),
            config.provider_timeout,
        )?)),
        None => info!("ALPHA_VANTAGE_API_KEY not set, Alpha Vantage disabled"),
    }
    match &config.fred_api_key {
        Some(key) => providers.push(Arc::new(FredProvider::new(
            key.clone(),
            config.provider_timeout,
        )?)),
        None => info!("FRED_API_KEY not set, macro tools disabled"),
    }

    Ok(providers)
}

/// Merge operator overrides with each provider's declared limit.
fn apply_rate_limit_overrides(
    rate_limiter: &RateLimiter,
    providers: &[Arc<dyn MarketDataProvider>],
    overrides: &[RateLimitOverride],
) {
    for limit in overrides {
        let Some(provider) = providers.iter().find(|p| p.id() == limit.provider) else {
            debug!("Rate limit override for unregistered provider {}", limit.provider);
            continue;
        };
        let declared = RateLimitConfig::from(provider.rate_limit());
        let merged = RateLimitConfig {
            requests_per_minute: limit
                .requests_per_minute
                .unwrap_or(declared.requests_per_minute),
            burst_capacity: limit.burst_capacity.unwrap_or(declared.burst_capacity),
        };
        info!(
            "Rate limit for {}: {} rpm, burst {}",
            limit.provider, merged.requests_per_minute, merged.burst_capacity
        );
        rate_limiter.configure(&Cow::Borrowed(limit.provider), merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let mut all: HashMap<String, String> = [
            ("FINMCP_AUTH_ISSUER", "https://auth.example.com"),
            ("FINMCP_AUTH_AUDIENCE", "financemcp"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        all.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Config::from_lookup(|key| all.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_keyed_providers_need_keys() {
        let ids: Vec<_> = build_providers(&config(&[])).unwrap().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["YAHOO"]);

        let ids: Vec<_> = build_providers(&config(&[
            ("ALPHA_VANTAGE_API_KEY", "av"),
            ("FRED_API_KEY", "fred"),
        ]))
        .unwrap()
        .iter()
        .map(|p| p.id())
        .collect();
        assert_eq!(ids, vec!["YAHOO", "ALPHA_VANTAGE", "FRED"]);
    }

    #[test]
    fn test_override_keeps_declared_burst() {
        let config = config(&[
            ("ALPHA_VANTAGE_API_KEY", "av"),
            ("FINMCP_RATE_LIMIT_ALPHA_VANTAGE_RPM", "60"),
        ]);
        let providers = build_providers(&config).unwrap();
        let limiter = RateLimiter::new();
        apply_rate_limit_overrides(&limiter, &providers, &config.rate_limits);

        let id = Cow::Borrowed("ALPHA_VANTAGE");
        let declared = providers
            .iter()
            .find(|p| p.id() == "ALPHA_VANTAGE")
            .map(|p| p.rate_limit().burst_capacity)
            .unwrap();
        assert_eq!(limiter.remaining_tokens(&id), declared as f64);
    }

    #[tokio::test]
    async fn test_build_state() {
        let state = build_state(&config(&[("FINMCP_SERVER_NAME", "Test")]))
            .await
            .unwrap();
        assert_eq!(state.server_name, "Test");
        assert_eq!(state.orchestrator.provider_ids(), vec!["YAHOO"]);
        assert_eq!(state.metadata.audience, "financemcp");
    }
}
