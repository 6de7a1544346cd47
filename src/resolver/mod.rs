//! Upstream lookup — the slow path of the resolution pipeline.
//!
//! ## Core types
//!
//! - [`LookupService`] — seam for the remote listing lookup dependency;
//!   implemented over HTTP by [`HttpLookupService`] and by in-memory doubles
//!   in tests.
//! - [`RemoteResolver`] — wraps a [`LookupService`] with a per-attempt
//!   deadline and bounded retries with exponential backoff.
//! - [`ResolvedResult`] / [`Source`] — the immutable outcome every layer of
//!   the pipeline hands back to callers.
//!
//! Retry policy: `Timeout` and `Upstream` failures are retried up to the
//! configured bound; `NotFound` is a terminal answer from the service and is
//! surfaced on first response. The service has no guaranteed SLA, so the
//! deadline is enforced here, on the caller side.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ResolveError;

/// Where a resolution's answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served from the resolution cache.
    Cache,
    /// Synthesized fallback URL, dispatched before any I/O.
    Fallback,
    /// Authoritative correction replacing an optimistic fallback.
    Enhanced,
    /// Fresh answer from the upstream lookup service.
    Api,
}

/// The authoritative outcome of resolving one reference code.
///
/// Immutable once created; the cache stores it verbatim and hands out clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedResult {
    /// The normalized reference this result answers.
    pub reference: String,
    /// Canonical destination URL for the listing.
    pub canonical_url: String,
    /// Which layer produced this result.
    pub source: Source,
    /// Milliseconds from first upstream attempt to final success; zero for
    /// cache hits and synthesized fallbacks.
    pub response_time_ms: u64,
}

/// The remote listing lookup dependency.
///
/// Returns the canonical listing URL for a reference, or
/// [`ResolveError::NotFound`] when the service explicitly has no match.
/// Implementations **must** be `Send + Sync`: one service instance is shared
/// across every in-flight resolution task.
pub trait LookupService: Send + Sync {
    /// Look up a single normalized reference code.
    ///
    /// Transport failures and 5xx responses map to
    /// [`ResolveError::Upstream`]; the deadline is **not** this trait's
    /// concern (the [`RemoteResolver`] enforces it).
    fn lookup(
        &self,
        reference: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ResolveError>> + Send>>;
}

/// Wire format of a successful lookup response.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    path: String,
}

/// HTTP implementation of [`LookupService`].
///
/// Issues `GET {base_url}/listings/lookup/{reference}` and expects a JSON
/// body `{"path": "..."}` on success. A `404` is the service's explicit
/// not-found indication and maps to [`ResolveError::NotFound`]; any other
/// non-success status or transport error maps to [`ResolveError::Upstream`].
///
/// The client carries no timeout of its own — the resolver's deadline wraps
/// each attempt.
pub struct HttpLookupService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLookupService {
    /// Creates a lookup client against the given service base URL
    /// (e.g. `"https://catalog.example.com/api"`; no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl LookupService for HttpLookupService {
    fn lookup(
        &self,
        reference: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ResolveError>> + Send>> {
        let client = self.client.clone();
        let url = format!("{}/listings/lookup/{}", self.base_url, reference);
        let reference = reference.to_owned();

        Box::pin(async move {
            let response = client.get(&url).send().await.map_err(|e| {
                ResolveError::Upstream {
                    message: e.to_string(),
                }
            })?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ResolveError::NotFound { reference });
            }
            if !response.status().is_success() {
                return Err(ResolveError::Upstream {
                    message: format!("unexpected status {}", response.status()),
                });
            }

            let body: LookupResponse =
                response.json().await.map_err(|e| ResolveError::Upstream {
                    message: format!("malformed lookup response: {e}"),
                })?;
            Ok(body.path)
        })
    }
}

/// Bounded-retry, deadline-enforcing wrapper around a [`LookupService`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use refnav::resolver::{HttpLookupService, RemoteResolver};
///
/// let service = Arc::new(HttpLookupService::new("https://catalog.example.com/api"));
/// let resolver = RemoteResolver::new(service, Duration::from_secs(5), 2, Duration::from_millis(250));
/// ```
pub struct RemoteResolver {
    service: Arc<dyn LookupService>,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl RemoteResolver {
    /// Creates a resolver over `service`.
    ///
    /// `max_retries` counts *additional* attempts after the first, so the
    /// total attempt bound is `max_retries + 1`. `backoff_base` is doubled
    /// after each failed attempt.
    pub fn new(
        service: Arc<dyn LookupService>,
        timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            service,
            timeout,
            max_retries,
            backoff_base,
        }
    }

    /// Resolves `reference` against the upstream service.
    ///
    /// On success, `response_time_ms` covers the whole call including any
    /// failed attempts and backoff sleeps, since that is the latency the
    /// caller actually experienced.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotFound`] on first explicit no-match; the last
    /// classified [`ResolveError::Timeout`] or [`ResolveError::Upstream`]
    /// once the retry bound is exhausted.
    pub async fn lookup(&self, reference: &str) -> Result<ResolvedResult, ResolveError> {
        let started = Instant::now();

        let mut attempt = 0;
        loop {
            match self.attempt(reference).await {
                Ok(canonical_url) => {
                    let response_time_ms = started.elapsed().as_millis() as u64;
                    debug!(reference, attempt, response_time_ms, "upstream lookup succeeded");
                    return Ok(ResolvedResult {
                        reference: reference.to_owned(),
                        canonical_url,
                        source: Source::Api,
                        response_time_ms,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff_for(attempt);
                    warn!(reference, attempt, error = %err, ?backoff, "upstream lookup failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(reference, attempt, error = %err, "upstream lookup failed");
                    return Err(err);
                }
            }
        }
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// Doubles per attempt; the exponent is capped and the multiply
    /// saturates, so an aggressive `max_retries` cannot overflow.
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.pow(attempt.min(31)))
    }

    async fn attempt(&self, reference: &str) -> Result<String, ResolveError> {
        tokio::time::timeout(self.timeout, self.service.lookup(reference))
            .await
            .map_err(|_| ResolveError::Timeout {
                timeout: self.timeout,
            })?
    }
}
