// Harvester: the public entry point.
//
// harvest(resource, options) validates, consults the listing cache, and on a
// miss joins or starts the single in-flight execution for that exact request.
// Executions run as their own task so a caller that stops waiting never
// aborts the chain or the cache write other callers depend on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use creatorsignal_common::{
    normalize_resource, validate_identity, CacheConfig, ChainConfig, Config, CreatorProfile,
    Endpoints, HarvestError, HarvestOptions, HarvestResponse, HarvestResult, RankedCreator,
    RateLimiter, Result, Sort, TimeWindow, LISTING_NAMESPACE, PROFILE_NAMESPACE,
};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reddit_client::RedditClient;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::cache::{CacheBackend, CacheStats, CacheStore, MemoryBackend};
use crate::chain::StrategyChain;
use crate::fetchers::SerperFetcher;
use crate::strategies::{default_strategies, Strategy, StrategyRequest};
use crate::upstream::{HttpUpstream, Upstream};

const MIN_FETCH_LIMIT: usize = 25;
const MAX_FETCH_LIMIT: usize = 100;

type SharedHarvest = Shared<BoxFuture<'static, Result<HarvestResult>>>;

/// One validated request, everything needed to execute it.
#[derive(Debug, Clone)]
struct Plan {
    resource: String,
    sort: Sort,
    time_window: TimeWindow,
    limit: usize,
    include_profiles: bool,
}

impl Plan {
    fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.resource,
            self.sort,
            self.time_window,
            self.limit,
            if self.include_profiles { "profiles" } else { "plain" }
        )
    }

    fn fetch_limit(&self) -> usize {
        (self.limit * 4).clamp(MIN_FETCH_LIMIT, MAX_FETCH_LIMIT)
    }
}

struct HarvesterInner {
    chain: StrategyChain,
    upstream: Arc<dyn Upstream>,
    cache: CacheStore,
    output_limit: usize,
    max_output_limit: usize,
    in_flight: Mutex<HashMap<String, SharedHarvest>>,
}

#[derive(Clone)]
pub struct Harvester {
    inner: Arc<HarvesterInner>,
}

impl Harvester {
    /// Wire the production stack: one shared rate limiter in front of the
    /// platform client and the search fetcher, default strategy table, and an
    /// in-memory cache.
    pub fn from_config(config: &Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let reddit = RedditClient::new(
            config.credentials.clone(),
            config.endpoints.clone(),
            limiter.clone(),
            config.upstream_timeout,
        )?;

        let search = if config.serper_api_key.is_empty() {
            info!("SERPER_API_KEY not set, search-discovery strategy will report failures");
            None
        } else {
            Some(SerperFetcher::new(
                &config.serper_api_key,
                &config.endpoints.search_url,
                limiter,
                config.upstream_timeout,
            )?)
        };

        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(reddit, search));
        Ok(Self::builder(upstream)
            .endpoints(config.endpoints.clone())
            .chain_config(config.chain.clone())
            .cache_config(config.cache.clone())
            .output_limits(config.output_limit, config.max_output_limit)
            .build())
    }

    pub fn builder(upstream: Arc<dyn Upstream>) -> HarvesterBuilder {
        HarvesterBuilder {
            upstream,
            endpoints: Endpoints::default(),
            strategies: None,
            chain: ChainConfig::default(),
            cache: CacheConfig::default(),
            backend: None,
            output_limit: 15,
            max_output_limit: 100,
        }
    }

    /// Harvest ranked creators for `resource`.
    ///
    /// Invalid names and a zero `limit` fail before any upstream call. Strategy
    /// failures never surface here: when every strategy comes up empty the
    /// result is an empty success with state `Exhausted`.
    pub async fn harvest(&self, resource: &str, options: HarvestOptions) -> Result<HarvestResult> {
        let started = Instant::now();
        let plan = self.plan(resource, &options)?;
        let key = plan.cache_key();

        if options.force_refresh {
            info!(resource = %plan.resource, key = %key, "harvest: cache bypassed");
        } else if let Some(mut cached) = self
            .inner
            .cache
            .get::<HarvestResult>(LISTING_NAMESPACE, &key)
            .await
        {
            info!(resource = %plan.resource, key = %key, "harvest: cache hit");
            cached.cache_hit = true;
            cached.execution_time_ms = elapsed_ms(started);
            return Ok(cached);
        } else {
            info!(resource = %plan.resource, key = %key, "harvest: cache miss");
        }

        self.join_or_start(key, plan).await
    }

    /// `harvest` wrapped in the `{ ok, data | error }` envelope.
    pub async fn harvest_response(&self, resource: &str, options: HarvestOptions) -> HarvestResponse {
        self.harvest(resource, options).await.into()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats().await
    }

    /// Drop every cached entry in `namespace`. Returns how many were removed.
    pub async fn flush(&self, namespace: &str) -> usize {
        let removed = self.inner.cache.flush(namespace).await;
        info!(namespace, removed, "harvest: cache namespace flushed");
        removed
    }

    fn plan(&self, resource: &str, options: &HarvestOptions) -> Result<Plan> {
        let resource = normalize_resource(resource)?;
        let limit = match options.limit {
            Some(0) => {
                return Err(HarvestError::Validation(
                    "limit must be at least 1".to_string(),
                ))
            }
            Some(n) => n.min(self.inner.max_output_limit),
            None => self.inner.output_limit.min(self.inner.max_output_limit),
        };
        Ok(Plan {
            resource,
            sort: options.sort,
            time_window: options.time_window,
            limit,
            include_profiles: options.include_profiles,
        })
    }

    fn join_or_start(&self, key: String, plan: Plan) -> SharedHarvest {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(&key) {
            debug!(key = %key, "harvest: joining in-flight execution");
            return existing.clone();
        }

        // The task removes its own key; it cannot run that removal before the
        // insert below because the map lock is held until this function returns.
        let inner = self.inner.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = inner.execute(&task_key, plan).await;
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_key);
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(HarvestError::external(
                    "harvester",
                    None,
                    format!("harvest task did not complete: {e}"),
                ))
            })
        }
        .boxed()
        .shared();

        in_flight.insert(key, shared.clone());
        shared
    }
}

impl HarvesterInner {
    async fn execute(&self, key: &str, plan: Plan) -> Result<HarvestResult> {
        let started = Instant::now();
        let request = StrategyRequest {
            resource: plan.resource.clone(),
            sort: plan.sort,
            time_window: plan.time_window,
            fetch_limit: plan.fetch_limit(),
        };

        let outcome = self.chain.run(&request).await;
        let mut records = aggregate(&outcome.records, plan.limit);

        if plan.include_profiles {
            self.attach_profiles(&mut records).await;
        }

        let result = HarvestResult {
            resource: plan.resource.clone(),
            total: records.len(),
            records,
            execution_time_ms: elapsed_ms(started),
            cache_hit: false,
            state: outcome.state,
            strategies: outcome.reports,
        };

        if result.records.is_empty() {
            debug!(key, "harvest: empty result not cached");
        } else {
            self.cache.set(LISTING_NAMESPACE, key, &result, None).await;
        }

        info!(
            resource = %result.resource,
            total = result.total,
            state = ?result.state,
            execution_time_ms = result.execution_time_ms,
            "harvest: complete"
        );
        Ok(result)
    }

    /// Sequential so profile lookups queue behind the same rate budget as
    /// everything else instead of bursting it.
    async fn attach_profiles(&self, records: &mut [RankedCreator]) {
        for record in records.iter_mut() {
            record.profile = self.profile(&record.username).await;
        }
    }

    async fn profile(&self, username: &str) -> Option<CreatorProfile> {
        if let Err(e) = validate_identity(username) {
            warn!(username, error = %e, "harvest: skipping profile for invalid identity");
            return None;
        }

        let key = username.to_lowercase();
        if let Some(cached) = self
            .cache
            .get::<CreatorProfile>(PROFILE_NAMESPACE, &key)
            .await
        {
            return Some(cached);
        }

        match self.upstream.profile(username).await {
            Ok(profile) => {
                self.cache.set(PROFILE_NAMESPACE, &key, &profile, None).await;
                Some(profile)
            }
            Err(e) => {
                warn!(username, error = %e, "harvest: profile fetch failed");
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Assembles a `Harvester` around any `Upstream`. Defaults mirror `Config`.
pub struct HarvesterBuilder {
    upstream: Arc<dyn Upstream>,
    endpoints: Endpoints,
    strategies: Option<Vec<Arc<dyn Strategy>>>,
    chain: ChainConfig,
    cache: CacheConfig,
    backend: Option<Arc<dyn CacheBackend>>,
    output_limit: usize,
    max_output_limit: usize,
}

impl HarvesterBuilder {
    /// Base URLs used when expanding the default strategy table.
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replace the default strategy table.
    pub fn strategies(mut self, strategies: Vec<Arc<dyn Strategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn chain_config(mut self, chain: ChainConfig) -> Self {
        self.chain = chain;
        self
    }

    /// Shorthand for tests that don't want to wait between strategies.
    pub fn inter_strategy_delay(mut self, delay: Duration) -> Self {
        self.chain.inter_strategy_delay = delay;
        self
    }

    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn output_limits(mut self, default: usize, max: usize) -> Self {
        self.output_limit = default;
        self.max_output_limit = max;
        self
    }

    pub fn build(self) -> Harvester {
        let strategies = self
            .strategies
            .unwrap_or_else(|| default_strategies(self.upstream.clone(), &self.endpoints));
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));

        Harvester {
            inner: Arc::new(HarvesterInner {
                chain: StrategyChain::new(strategies, self.chain),
                upstream: self.upstream,
                cache: CacheStore::with_backend(self.cache, backend),
                output_limit: self.output_limit,
                max_output_limit: self.max_output_limit,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }
}
