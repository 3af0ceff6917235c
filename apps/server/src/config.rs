use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context};
use financemcp_market_data::{CacheTtls, DataCategory, Exchange, RetryPolicy};
use jsonwebtoken::Algorithm;

pub const DISCOVERY_PATH: &str = "/.well-known/oauth-protected-resource";

pub struct Config {
    pub listen_addr: SocketAddr,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub server_name: String,
    pub provider_timeout: Duration,
    pub alpha_vantage_api_key: Option<String>,
    pub fred_api_key: Option<String>,
    pub primary_exchange: Exchange,
    pub secondary_exchange: Exchange,
    pub cache_ttls: CacheTtls,
    pub cache_sweep_interval: Duration,
    pub rate_limits: Vec<RateLimitOverride>,
    pub retry: RetryPolicy,
    pub auth: AuthConfig,
    pub resource: ResourceConfig,
}

/// Operator override for one provider's token bucket. Unset fields keep the
/// provider's declared limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitOverride {
    pub provider: &'static str,
    pub requests_per_minute: Option<u32>,
    pub burst_capacity: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_uri: String,
    pub introspection: Option<IntrospectionConfig>,
    pub algorithms: Vec<Algorithm>,
    pub leeway: Duration,
    pub decision_cache_window: Duration,
    pub jwks_refresh_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct IntrospectionConfig {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Protected-resource metadata advertised on the discovery path.
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub resource: String,
    pub metadata_url: String,
    pub authorization_servers: Vec<String>,
    pub resource_name: Option<String>,
    pub documentation: Option<String>,
    pub scopes_supported: Vec<String>,
}

const RATE_LIMITED_PROVIDERS: [&str; 3] = ["YAHOO", "ALPHA_VANTAGE", "FRED"];

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port: u16 = parse_or(&get, "PORT", 3000)?;
        let listen_addr: SocketAddr = match get("FINMCP_LISTEN_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid FINMCP_LISTEN_ADDR '{}'", raw))?,
            None => SocketAddr::from(([0, 0, 0, 0], port)),
        };

        let cors_allow = get("FINMCP_CORS_ALLOW_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| vec!["*".to_string()]);

        let request_timeout = Duration::from_millis(parse_or(&get, "FINMCP_REQUEST_TIMEOUT_MS", 30_000)?);
        let provider_timeout = Duration::from_secs(parse_or(&get, "FINMCP_PROVIDER_TIMEOUT_SECS", 15)?);

        let primary_exchange: Exchange = parse_or(&get, "FINMCP_PRIMARY_EXCHANGE", Exchange::Nse)?;
        let secondary_exchange: Exchange = parse_or(&get, "FINMCP_SECONDARY_EXCHANGE", Exchange::Bse)?;
        if primary_exchange == secondary_exchange {
            bail!("FINMCP_PRIMARY_EXCHANGE and FINMCP_SECONDARY_EXCHANGE must differ");
        }

        let default_ttl = Duration::from_secs(parse_or(&get, "FINMCP_CACHE_TTL_SECS", 300)?);
        let mut cache_ttls = CacheTtls::uniform(default_ttl)
            .with_override(DataCategory::Macro, financemcp_market_data::cache::DEFAULT_MACRO_TTL);
        for (suffix, category) in [
            ("QUOTE", DataCategory::Quote),
            ("HISTORY", DataCategory::History),
            ("FUNDAMENTALS", DataCategory::Fundamentals),
            ("SEARCH", DataCategory::Search),
            ("MACRO", DataCategory::Macro),
        ] {
            let key = format!("FINMCP_CACHE_TTL_{}_SECS", suffix);
            if let Some(secs) = parse_opt::<u64, _>(&get, &key)? {
                cache_ttls = cache_ttls.with_override(category, Duration::from_secs(secs));
            }
        }
        let cache_sweep_interval = Duration::from_secs(parse_or(&get, "FINMCP_CACHE_SWEEP_SECS", 60)?);
        if cache_sweep_interval.is_zero() {
            bail!("FINMCP_CACHE_SWEEP_SECS must be positive");
        }

        let mut rate_limits = Vec::new();
        for provider in RATE_LIMITED_PROVIDERS {
            let requests_per_minute = parse_opt(&get, &format!("FINMCP_RATE_LIMIT_{}_RPM", provider))?;
            let burst_capacity = parse_opt(&get, &format!("FINMCP_RATE_LIMIT_{}_BURST", provider))?;
            if requests_per_minute.is_some() || burst_capacity.is_some() {
                rate_limits.push(RateLimitOverride {
                    provider,
                    requests_per_minute,
                    burst_capacity,
                });
            }
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "FINMCP_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                "FINMCP_RETRY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            multiplier: parse_or(&get, "FINMCP_RETRY_MULTIPLIER", defaults.multiplier)?,
            max_delay: Duration::from_millis(parse_or(
                &get,
                "FINMCP_RETRY_MAX_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
            jitter: parse_or(&get, "FINMCP_RETRY_JITTER", defaults.jitter)?,
        };
        if retry.max_attempts == 0 {
            bail!("FINMCP_RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            bail!("FINMCP_RETRY_JITTER must be between 0 and 1");
        }

        let auth = auth_config(&get)?;
        let resource = resource_config(&get, &auth, listen_addr.port());

        Ok(Self {
            listen_addr,
            cors_allow,
            request_timeout,
            server_name: get("FINMCP_SERVER_NAME").unwrap_or_else(|| "FinanceMCP".to_string()),
            provider_timeout,
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY"),
            fred_api_key: get("FRED_API_KEY"),
            primary_exchange,
            secondary_exchange,
            cache_ttls,
            cache_sweep_interval,
            rate_limits,
            retry,
            auth,
            resource,
        })
    }
}

fn auth_config<G>(get: &G) -> anyhow::Result<AuthConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let issuer = get("FINMCP_AUTH_ISSUER").ok_or_else(|| anyhow!("FINMCP_AUTH_ISSUER is required"))?;
    let audience = get("FINMCP_AUTH_AUDIENCE").ok_or_else(|| anyhow!("FINMCP_AUTH_AUDIENCE is required"))?;
    let jwks_uri = get("FINMCP_AUTH_JWKS_URI").unwrap_or_else(|| format!("{}/keys", issuer.trim_end_matches('/')));

    let introspection = match get("FINMCP_AUTH_INTROSPECTION_URL") {
        Some(url) => Some(IntrospectionConfig {
            url,
            client_id: get("FINMCP_AUTH_CLIENT_ID")
                .ok_or_else(|| anyhow!("FINMCP_AUTH_CLIENT_ID is required for introspection"))?,
            client_secret: get("FINMCP_AUTH_CLIENT_SECRET")
                .ok_or_else(|| anyhow!("FINMCP_AUTH_CLIENT_SECRET is required for introspection"))?,
        }),
        None => None,
    };

    let algorithms = parse_algorithms(
        &get("FINMCP_AUTH_ALGORITHMS").unwrap_or_else(|| "RS256,ES256,EdDSA".to_string()),
    )?;

    Ok(AuthConfig {
        issuer,
        audience,
        jwks_uri,
        introspection,
        algorithms,
        leeway: Duration::from_secs(parse_or(get, "FINMCP_AUTH_LEEWAY_SECS", 0)?),
        decision_cache_window: Duration::from_secs(parse_or(get, "FINMCP_AUTH_CACHE_SECS", 60)?),
        jwks_refresh_interval: Duration::from_secs(parse_or(get, "FINMCP_AUTH_JWKS_REFRESH_SECS", 300)?),
    })
}

fn resource_config<G>(get: &G, auth: &AuthConfig, port: u16) -> ResourceConfig
where
    G: Fn(&str) -> Option<String>,
{
    let resource = get("FINMCP_RESOURCE_IDENTIFIER")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://localhost:{}", port));
    let metadata_url = get("FINMCP_RESOURCE_METADATA_URL")
        .unwrap_or_else(|| format!("{}{}", resource, DISCOVERY_PATH));
    let authorization_servers = get("FINMCP_AUTHORIZATION_SERVERS")
        .map(|raw| split_list(&raw))
        .unwrap_or_else(|| vec![auth.issuer.clone()]);

    ResourceConfig {
        resource,
        metadata_url,
        authorization_servers,
        resource_name: get("FINMCP_RESOURCE_NAME"),
        documentation: get("FINMCP_RESOURCE_DOCS_URL"),
        scopes_supported: get("FINMCP_SCOPES_SUPPORTED")
            .map(|raw| split_list(&raw))
            .unwrap_or_default(),
    }
}

/// Asymmetric algorithms only: a shared-secret JWT cannot be verified
/// against a published key set.
fn parse_algorithms(raw: &str) -> anyhow::Result<Vec<Algorithm>> {
    let mut algorithms = Vec::new();
    for name in split_list(raw) {
        let algorithm = Algorithm::from_str(&name)
            .map_err(|_| anyhow!("Unknown algorithm '{}' in FINMCP_AUTH_ALGORITHMS", name))?;
        if matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            bail!("Symmetric algorithm '{}' is not allowed in FINMCP_AUTH_ALGORITHMS", name);
        }
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }
    if algorithms.is_empty() {
        bail!("FINMCP_AUTH_ALGORITHMS must name at least one algorithm");
    }
    Ok(algorithms)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_opt<T, G>(get: &G, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {} '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const AUTH: [(&str, &str); 2] = [
        ("FINMCP_AUTH_ISSUER", "https://auth.example.com/"),
        ("FINMCP_AUTH_AUDIENCE", "financemcp"),
    ];

    #[test]
    fn test_defaults() {
        let config = config(&AUTH).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.cors_allow, vec!["*"]);
        assert_eq!(config.server_name, "FinanceMCP");
        assert_eq!(config.primary_exchange, Exchange::Nse);
        assert_eq!(config.auth.jwks_uri, "https://auth.example.com/keys");
        assert_eq!(
            config.auth.algorithms,
            vec![Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA]
        );
        assert!(config.auth.introspection.is_none());
        assert_eq!(config.cache_ttls.ttl_for(DataCategory::Quote), Duration::from_secs(300));
        assert_eq!(config.cache_ttls.ttl_for(DataCategory::Macro), Duration::from_secs(3600));
        assert_eq!(
            config.resource.metadata_url,
            "http://localhost:3000/.well-known/oauth-protected-resource"
        );
        assert_eq!(config.resource.authorization_servers, vec!["https://auth.example.com/"]);
        assert!(config.rate_limits.is_empty());
    }

    #[test]
    fn test_issuer_and_audience_are_required() {
        assert!(config(&[("FINMCP_AUTH_AUDIENCE", "x")]).is_err());
        assert!(config(&[("FINMCP_AUTH_ISSUER", "https://a")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut vars = AUTH.to_vec();
        vars.extend([
            ("PORT", "8080"),
            ("FINMCP_CACHE_TTL_SEARCH_SECS", "60"),
            ("FINMCP_RATE_LIMIT_ALPHA_VANTAGE_RPM", "75"),
            ("FINMCP_RETRY_MAX_ATTEMPTS", "5"),
            ("FINMCP_PRIMARY_EXCHANGE", "bse"),
            ("FINMCP_SECONDARY_EXCHANGE", "NSE"),
        ]);
        let config = config(&vars).unwrap();

        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.cache_ttls.ttl_for(DataCategory::Search), Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.primary_exchange, Exchange::Bse);
        assert_eq!(
            config.rate_limits,
            vec![RateLimitOverride {
                provider: "ALPHA_VANTAGE",
                requests_per_minute: Some(75),
                burst_capacity: None,
            }]
        );
    }

    #[test]
    fn test_invalid_values_fail() {
        let mut vars = AUTH.to_vec();
        vars.push(("FINMCP_REQUEST_TIMEOUT_MS", "soon"));
        assert!(config(&vars).is_err());

        let mut vars = AUTH.to_vec();
        vars.push(("FINMCP_AUTH_ALGORITHMS", "HS256"));
        assert!(config(&vars).is_err());

        let mut vars = AUTH.to_vec();
        vars.push(("FINMCP_AUTH_INTROSPECTION_URL", "https://auth.example.com/introspect"));
        assert!(config(&vars).is_err());
    }
}
