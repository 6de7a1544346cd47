//! Hybrid navigation — optimistic fallback first, authoritative answer later.
//!
//! [`HybridNavigator::navigate`] never makes the user wait on the network:
//! a deterministic fallback URL is synthesized from the normalized reference
//! and dispatched immediately, then a background task confirms or corrects
//! it once the pipeline has the authoritative answer.
//!
//! The flow is a small state machine:
//!
//! ```text
//! Idle → Validating → FallbackDispatched → Resolving → Confirmed
//!            │                                 │      ↘ Corrected
//!            └────────────→ Failed ←───────────┘
//! ```
//!
//! Two notification channels, with fixed cardinality per call:
//!
//! - `on_navigate` fires once (fallback) or twice (fallback, then an
//!   `enhanced` correction that should *replace* the current history entry).
//! - `on_error` fires at most once, and only as telemetry — a failure after
//!   the fallback dispatch never retracts the navigation that already
//!   happened. A wrong destination page beats a navigation that never
//!   happens.
//!
//! `InvalidReference` and `RateLimited` are the exceptions: both are decided
//! synchronously, before any navigation, so a rejected call goes nowhere.

use std::sync::Arc;

use tracing::debug;

use crate::engine::{ResolveOptions, ResolverEngine};
use crate::resolver::Source;

/// Synthesizes the optimistic fallback URL from a normalized reference.
///
/// Must be a pure function of its argument — no I/O, no clock. The slug
/// convention is a presentation-layer concern and is injected, not baked in.
pub type FallbackUrl = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Receives every navigation target: the fallback, and a correction if the
/// authoritative URL turns out to differ.
pub type NavigateCallback = Arc<dyn Fn(&str, Source) + Send + Sync>;

/// Receives at most one user-facing failure message per call.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Progress of one `navigate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Validating,
    FallbackDispatched,
    Resolving,
    /// The optimistic guess matched the authoritative URL; nothing to do.
    Confirmed,
    /// A correcting navigation was dispatched with `Source::Enhanced`.
    Corrected,
    Failed,
}

/// Orchestrates optimistic navigation over a [`ResolverEngine`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use refnav::engine::{EngineConfig, ResolveOptions, ResolverEngine};
/// use refnav::navigator::HybridNavigator;
/// use refnav::resolver::HttpLookupService;
///
/// let service = Arc::new(HttpLookupService::new("https://catalog.example.com/api"));
/// let engine = ResolverEngine::new(EngineConfig::default(), service);
///
/// let navigator = HybridNavigator::new(
///     engine,
///     Arc::new(|reference| format!("/listing/{reference}")),
///     Arc::new(|url, source| println!("navigate to {url} ({source:?})")),
///     Arc::new(|message| eprintln!("lookup failed: {message}")),
/// );
/// navigator.navigate("086983", &ResolveOptions::default());
/// ```
pub struct HybridNavigator {
    engine: ResolverEngine,
    fallback_url: FallbackUrl,
    on_navigate: NavigateCallback,
    on_error: ErrorCallback,
}

impl HybridNavigator {
    pub fn new(
        engine: ResolverEngine,
        fallback_url: FallbackUrl,
        on_navigate: NavigateCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            engine,
            fallback_url,
            on_navigate,
            on_error,
        }
    }

    /// Fire-and-forget hybrid navigation for one reference code.
    ///
    /// Synchronous part: validation, admission, and the fallback dispatch —
    /// no I/O, so `on_navigate` has already fired with `Source::Fallback` by
    /// the time this returns (unless the call was rejected outright).
    /// Confirmation/correction then runs on a spawned task; the caller does
    /// not wait for it, and abandoning the page does not cancel it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn navigate(&self, reference: &str, options: &ResolveOptions) {
        let metrics = self.engine.metrics_collector();
        metrics.record_request();
        debug!(reference, state = ?NavigationState::Validating, "hybrid navigation started");

        let query = match crate::reference::normalize(reference) {
            Ok(query) => query,
            Err(err) => {
                metrics.record_error();
                debug!(reference, state = ?NavigationState::Failed, error = %err, "validation failed");
                (self.on_error)(err.user_message());
                return;
            }
        };

        let client_id = options
            .client_id
            .clone()
            .unwrap_or_else(|| crate::limiter::ANONYMOUS_CLIENT.to_owned());
        if let Err(err) = self.engine.admit(&client_id) {
            metrics.record_error();
            debug!(reference, state = ?NavigationState::Failed, error = %err, "admission rejected");
            (self.on_error)(err.user_message());
            return;
        }

        let fallback = (self.fallback_url)(query.normalized());
        (self.on_navigate)(&fallback, Source::Fallback);
        debug!(
            reference = query.normalized(),
            url = %fallback,
            state = ?NavigationState::FallbackDispatched,
            "optimistic navigation dispatched"
        );

        let engine = self.engine.clone();
        let on_navigate = Arc::clone(&self.on_navigate);
        let on_error = Arc::clone(&self.on_error);
        tokio::spawn(async move {
            debug!(reference = query.normalized(), state = ?NavigationState::Resolving, "confirming in background");
            match engine.resolve_admitted(&query).await {
                Ok(result) if result.canonical_url == fallback => {
                    debug!(
                        reference = query.normalized(),
                        state = ?NavigationState::Confirmed,
                        "optimistic guess confirmed"
                    );
                }
                Ok(result) => {
                    debug!(
                        reference = query.normalized(),
                        url = %result.canonical_url,
                        state = ?NavigationState::Corrected,
                        "replacing optimistic destination"
                    );
                    on_navigate(&result.canonical_url, Source::Enhanced);
                }
                Err(err) => {
                    engine.metrics_collector().record_error();
                    debug!(
                        reference = query.normalized(),
                        state = ?NavigationState::Failed,
                        error = %err,
                        "background confirmation failed"
                    );
                    on_error(err.user_message());
                }
            }
        });
    }
}
