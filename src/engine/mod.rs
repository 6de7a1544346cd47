//! The resolution engine — one context object wiring every component.
//!
//! [`ResolverEngine`] owns the cache, rate limiter, request coordinator,
//! remote resolver, and metrics collector, constructed once from an
//! [`EngineConfig`] and shared by cheap clone (everything inside is an
//! `Arc`). Nothing in this crate lives in module-level state; test isolation
//! comes from constructing a fresh engine or calling
//! [`ResolverEngine::reset`].
//!
//! The boundary operation [`ResolverEngine::resolve_reference`] runs the
//! full pipeline: normalize, admission control, cache fast path, coalesced
//! upstream slow path, metrics on every outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::ResolutionCache;
use crate::coordinator::RequestCoordinator;
use crate::error::ResolveError;
use crate::limiter::{ANONYMOUS_CLIENT, RateLimiter};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::reference::{self, ReferenceQuery};
use crate::resolver::{LookupService, RemoteResolver, ResolvedResult, Source};

/// Tuning knobs for the engine, with every default spelled out.
///
/// | Field                   | Default  |
/// |-------------------------|----------|
/// | `timeout`               | 5 s      |
/// | `max_retries`           | 2        |
/// | `backoff_base`          | 250 ms   |
/// | `ttl`                   | 5 min    |
/// | `cache_capacity`        | 256      |
/// | `rate_limit_per_window` | 5        |
/// | `window`                | 60 s     |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-attempt deadline for the upstream lookup.
    pub timeout: Duration,
    /// Additional upstream attempts after the first.
    pub max_retries: u32,
    /// First retry delay; doubled after each failed attempt.
    pub backoff_base: Duration,
    /// How long a resolved result stays servable from the cache.
    pub ttl: Duration,
    /// Maximum number of cached resolutions before LRU eviction.
    pub cache_capacity: usize,
    /// Requests admitted per client within one sliding window.
    pub rate_limit_per_window: usize,
    /// Sliding-window width for rate limiting.
    pub window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            ttl: Duration::from_secs(300),
            cache_capacity: 256,
            rate_limit_per_window: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-call options for a boundary resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Client identity for rate limiting; `None` shares the fail-closed
    /// anonymous bucket.
    pub client_id: Option<String>,
}

impl ResolveOptions {
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
        }
    }

    fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(ANONYMOUS_CLIENT)
    }
}

/// Shared context for the whole resolution pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use refnav::engine::{EngineConfig, ResolveOptions, ResolverEngine};
/// use refnav::resolver::HttpLookupService;
///
/// # async fn demo() -> Result<(), refnav::error::ResolveError> {
/// let service = Arc::new(HttpLookupService::new("https://catalog.example.com/api"));
/// let engine = ResolverEngine::new(EngineConfig::default(), service);
///
/// let result = engine
///     .resolve_reference("086983", &ResolveOptions::default())
///     .await?;
/// println!("{} -> {}", result.reference, result.canonical_url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResolverEngine {
    cache: Arc<ResolutionCache>,
    limiter: Arc<RateLimiter>,
    coordinator: Arc<RequestCoordinator>,
    resolver: Arc<RemoteResolver>,
    metrics: Arc<MetricsCollector>,
    ttl: Duration,
}

impl ResolverEngine {
    /// Builds the full pipeline over the given lookup service.
    pub fn new(config: EngineConfig, service: Arc<dyn LookupService>) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        Self {
            cache: Arc::new(ResolutionCache::new(config.cache_capacity)),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_per_window, config.window)),
            coordinator: Arc::new(RequestCoordinator::new(Arc::clone(&metrics))),
            resolver: Arc::new(RemoteResolver::new(
                service,
                config.timeout,
                config.max_retries,
                config.backoff_base,
            )),
            metrics,
            ttl: config.ttl,
        }
    }

    /// Resolves a raw reference code to its canonical destination.
    ///
    /// Pipeline order: normalization, rate-limit admission, cache fast path,
    /// coalesced upstream slow path. `InvalidReference` and `RateLimited`
    /// surface before any cache or coordinator state is touched.
    ///
    /// # Errors
    ///
    /// Any variant of [`ResolveError`], classified per the taxonomy in
    /// [`crate::error`].
    pub async fn resolve_reference(
        &self,
        reference: &str,
        options: &ResolveOptions,
    ) -> Result<ResolvedResult, ResolveError> {
        self.metrics.record_request();

        let outcome = async {
            let query = reference::normalize(reference)?;
            self.admit(options.client_id())?;
            self.resolve_admitted(&query).await
        }
        .await;

        if outcome.is_err() {
            self.metrics.record_error();
        }
        outcome
    }

    /// Rate-limit admission for one call. Rejection records nothing.
    pub(crate) fn admit(&self, client_id: &str) -> Result<(), ResolveError> {
        if self.limiter.check(client_id) {
            Ok(())
        } else {
            Err(ResolveError::RateLimited {
                client_id: client_id.to_owned(),
            })
        }
    }

    /// Cache fast path, then the coalesced upstream slow path.
    ///
    /// Assumes the caller already normalized the input and passed admission.
    pub(crate) async fn resolve_admitted(
        &self,
        query: &ReferenceQuery,
    ) -> Result<ResolvedResult, ResolveError> {
        let key = query.key();

        if let Some(cached) = self.cache.get(&key) {
            self.metrics.record_hit();
            debug!(reference = query.normalized(), "resolved from cache");
            return Ok(ResolvedResult {
                source: Source::Cache,
                response_time_ms: 0,
                ..cached
            });
        }
        self.metrics.record_miss();

        let resolver = Arc::clone(&self.resolver);
        let cache = Arc::clone(&self.cache);
        let metrics = Arc::clone(&self.metrics);
        let ttl = self.ttl;
        let reference = query.normalized().to_owned();
        let factory_key = key.clone();

        self.coordinator
            .resolve(&key, move || async move {
                let result = resolver.lookup(&reference).await?;
                metrics.record_response_time(result.response_time_ms);
                cache.put(&factory_key, result.clone(), ttl);
                Ok(result)
            })
            .await
    }

    /// Current telemetry counters plus the live cache size.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.cache.len() as u64)
    }

    pub(crate) fn metrics_collector(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Clears cache, rate windows, and counters for test isolation.
    ///
    /// In-flight resolutions are not interrupted; their results will
    /// repopulate the cache when they settle.
    pub fn reset(&self) {
        self.cache.clear();
        self.limiter.clear();
        self.metrics.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// In-memory lookup double: knows a fixed set of references and counts calls.
    struct StaticCatalog {
        calls: AtomicU32,
    }

    impl StaticCatalog {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LookupService for StaticCatalog {
        fn lookup(
            &self,
            reference: &str,
        ) -> Pin<Box<dyn Future<Output = Result<String, ResolveError>> + Send>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reference = reference.to_owned();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if reference == "999999" {
                    Err(ResolveError::NotFound { reference })
                } else {
                    Ok(format!("/listing/{reference}"))
                }
            })
        }
    }

    fn engine_with(config: EngineConfig) -> (ResolverEngine, Arc<StaticCatalog>) {
        let catalog = StaticCatalog::new();
        (
            ResolverEngine::new(config, Arc::clone(&catalog) as Arc<dyn LookupService>),
            catalog,
        )
    }

    fn engine() -> (ResolverEngine, Arc<StaticCatalog>) {
        engine_with(EngineConfig::default())
    }

    // ── Scenario A: first resolution hits the api, the second the cache ──────

    #[tokio::test(start_paused = true)]
    async fn first_resolve_is_api_second_is_cache() {
        let (engine, catalog) = engine();
        let options = ResolveOptions::default();

        let first = engine.resolve_reference("086983", &options).await.unwrap();
        assert_eq!(first.source, Source::Api);
        assert_eq!(first.canonical_url, "/listing/086983");

        let second = engine.resolve_reference("086983", &options).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.response_time_ms, 0);
        assert_eq!(catalog.calls(), 1);

        let snap = engine.metrics();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.cache_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_forces_a_fresh_lookup() {
        let (engine, catalog) = engine();
        let options = ResolveOptions::default();

        engine.resolve_reference("086983", &options).await.unwrap();
        tokio::time::advance(EngineConfig::default().ttl + Duration::from_secs(1)).await;

        let again = engine.resolve_reference("086983", &options).await.unwrap();
        assert_eq!(again.source, Source::Api);
        assert_eq!(catalog.calls(), 2);
    }

    // ── Dedup invariant across the whole pipeline ─────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn concurrent_resolutions_share_one_upstream_call() {
        let (engine, catalog) = engine_with(EngineConfig {
            rate_limit_per_window: 10,
            ..EngineConfig::default()
        });
        let options = ResolveOptions::default();

        let (a, b, c) = tokio::join!(
            engine.resolve_reference("086983", &options),
            engine.resolve_reference("086983", &options),
            engine.resolve_reference("086983", &options),
        );

        assert_eq!(catalog.calls(), 1);
        let url = a.unwrap().canonical_url;
        assert_eq!(b.unwrap().canonical_url, url);
        assert_eq!(c.unwrap().canonical_url, url);
        assert_eq!(engine.metrics().deduped_requests, 2);
    }

    // ── Error paths ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn not_found_surfaces_and_counts_one_error() {
        let (engine, catalog) = engine();
        let err = engine
            .resolve_reference("999999", &ResolveOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::NotFound { .. }));
        // Terminal outcome: no retries burned against it.
        assert_eq!(catalog.calls(), 1);
        assert_eq!(engine.metrics().errors, 1);
    }

    #[tokio::test]
    async fn invalid_reference_touches_no_pipeline_state() {
        let (engine, catalog) = engine();
        let err = engine
            .resolve_reference("##", &ResolveOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::InvalidReference { .. }));
        assert_eq!(catalog.calls(), 0);
        let snap = engine.metrics();
        assert_eq!(snap.cache_size, 0);
        assert_eq!(snap.hits + snap.misses, 0);
        assert_eq!(snap.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_boundary() {
        let (engine, _) = engine_with(EngineConfig {
            rate_limit_per_window: 5,
            ..EngineConfig::default()
        });
        let options = ResolveOptions::for_client("client-a");

        for i in 0..5 {
            let reference = format!("10000{i}");
            engine.resolve_reference(&reference, &options).await.unwrap();
        }
        let err = engine
            .resolve_reference("100006", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::RateLimited { .. }));

        // After the window fully elapses the same client is admitted again.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(engine.resolve_reference("100006", &options).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hits_do_not_replay_upstream_latency_into_the_mean() {
        let (engine, _) = engine();
        let options = ResolveOptions::default();

        engine.resolve_reference("086983", &options).await.unwrap();
        let after_api = engine.metrics().avg_response_time_ms;

        engine.resolve_reference("086983", &options).await.unwrap();
        assert_eq!(engine.metrics().avg_response_time_ms, after_api);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_a_cold_engine() {
        let (engine, catalog) = engine();
        let options = ResolveOptions::default();

        engine.resolve_reference("086983", &options).await.unwrap();
        engine.reset();

        let snap = engine.metrics();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.cache_size, 0);

        let again = engine.resolve_reference("086983", &options).await.unwrap();
        assert_eq!(again.source, Source::Api);
        assert_eq!(catalog.calls(), 2);
    }
}
