use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{HarvestError, Result};
use crate::rate_limit::RateLimitConfig;

pub const LISTING_NAMESPACE: &str = "community-listing";
pub const PROFILE_NAMESPACE: &str = "identity-profile";

/// Client-credential pair and the user agent sent with every platform call.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Upstream base URLs. Overridable so tests and proxies can point elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    pub oauth_base: String,
    pub public_base: String,
    pub old_base: String,
    pub search_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            oauth_base: "https://oauth.reddit.com".to_string(),
            public_base: "https://www.reddit.com".to_string(),
            old_base: "https://old.reddit.com".to_string(),
            search_url: "https://google.serper.dev/search".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub namespace_ttls: HashMap<String, Duration>,
}

impl CacheConfig {
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.namespace_ttls
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            namespace_ttls: HashMap::from([
                (LISTING_NAMESPACE.to_string(), Duration::from_secs(900)),
                (PROFILE_NAMESPACE.to_string(), Duration::from_secs(3600)),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Unique records that end the chain early.
    pub sufficiency_threshold: usize,
    /// Records scoring below this are not treated as creator signals.
    pub min_record_score: i64,
    /// Pause inserted before every strategy after the first.
    pub inter_strategy_delay: Duration,
    /// Ceiling on an upstream Retry-After hint honoured between strategies.
    pub max_retry_after: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sufficiency_threshold: 10,
            min_record_score: 0,
            inter_strategy_delay: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

/// Harvester configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub serper_api_key: String,
    pub endpoints: Endpoints,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub chain: ChainConfig,
    pub output_limit: usize,
    pub max_output_limit: usize,
    pub upstream_timeout: Duration,
}

impl Config {
    /// Defaults for everything except credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            serper_api_key: String::new(),
            endpoints: Endpoints::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            chain: ChainConfig::default(),
            output_limit: 15,
            max_output_limit: 100,
            upstream_timeout: Duration::from_secs(15),
        }
    }

    /// Load configuration from environment variables.
    /// Missing credentials or unparseable numbers are reported, not panicked on.
    pub fn from_env() -> Result<Self> {
        let credentials = Credentials {
            client_id: required_env("REDDIT_CLIENT_ID")?,
            client_secret: required_env("REDDIT_CLIENT_SECRET")?,
            user_agent: env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| format!("creatorsignal/{}", env!("CARGO_PKG_VERSION"))),
        };
        let mut config = Self::with_credentials(credentials);
        let defaults = Endpoints::default();

        config.serper_api_key = env::var("SERPER_API_KEY").unwrap_or_default();
        config.endpoints = Endpoints {
            token_url: env::var("REDDIT_TOKEN_URL").unwrap_or(defaults.token_url),
            oauth_base: env::var("REDDIT_OAUTH_BASE").unwrap_or(defaults.oauth_base),
            public_base: env::var("REDDIT_PUBLIC_BASE").unwrap_or(defaults.public_base),
            old_base: env::var("REDDIT_OLD_BASE").unwrap_or(defaults.old_base),
            search_url: env::var("SERPER_URL").unwrap_or(defaults.search_url),
        };
        config.rate_limit = RateLimitConfig {
            capacity: parsed_env("RATE_LIMIT_MAX_REQUESTS", 30)?,
            window: Duration::from_secs(parsed_env("RATE_LIMIT_WINDOW_SECS", 60)?),
        };
        config.cache = CacheConfig {
            default_ttl: Duration::from_secs(parsed_env("CACHE_DEFAULT_TTL_SECS", 300)?),
            namespace_ttls: HashMap::from([
                (
                    LISTING_NAMESPACE.to_string(),
                    Duration::from_secs(parsed_env("CACHE_LISTING_TTL_SECS", 900)?),
                ),
                (
                    PROFILE_NAMESPACE.to_string(),
                    Duration::from_secs(parsed_env("CACHE_PROFILE_TTL_SECS", 3600)?),
                ),
            ]),
        };
        let upstream_timeout = Duration::from_secs(parsed_env("UPSTREAM_TIMEOUT_SECS", 15)?);
        config.chain = ChainConfig {
            sufficiency_threshold: parsed_env("SUFFICIENCY_THRESHOLD", 10)?,
            min_record_score: parsed_env("MIN_RECORD_SCORE", 0)?,
            inter_strategy_delay: Duration::from_millis(parsed_env("STRATEGY_DELAY_MS", 500)?),
            max_retry_after: Duration::from_secs(parsed_env("MAX_RETRY_AFTER_SECS", 60)?),
        };
        config.output_limit = parsed_env("OUTPUT_LIMIT", 15)?;
        config.max_output_limit = parsed_env("MAX_OUTPUT_LIMIT", 100)?;
        config.upstream_timeout = upstream_timeout;

        if config.output_limit == 0 || config.output_limit > config.max_output_limit {
            return Err(HarvestError::Config(format!(
                "OUTPUT_LIMIT must be between 1 and MAX_OUTPUT_LIMIT ({})",
                config.max_output_limit
            )));
        }
        Ok(config)
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            client_id = %self.credentials.client_id,
            user_agent = %self.credentials.user_agent,
            search_enabled = !self.serper_api_key.is_empty(),
            rate_limit_capacity = self.rate_limit.capacity,
            rate_limit_window_secs = self.rate_limit.window.as_secs(),
            cache_default_ttl_secs = self.cache.default_ttl.as_secs(),
            sufficiency_threshold = self.chain.sufficiency_threshold,
            min_record_score = self.chain.min_record_score,
            output_limit = self.output_limit,
            "Harvester configuration loaded"
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HarvestError::Config(format!("{key} environment variable is required")))
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HarvestError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}
