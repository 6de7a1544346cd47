//! # refnav
//!
//! A client-side reference resolution engine: short user-typed reference
//! codes are resolved to authoritative listing URLs, with request
//! coalescing, TTL/LRU caching, sliding-window rate limiting, and hybrid
//! optimistic navigation that never blocks on the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use refnav::engine::{EngineConfig, ResolveOptions, ResolverEngine};
//! use refnav::resolver::HttpLookupService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(HttpLookupService::new("https://catalog.example.com/api"));
//!     let engine = ResolverEngine::new(EngineConfig::default(), service);
//!
//!     let result = engine
//!         .resolve_reference("086983", &ResolveOptions::default())
//!         .await?;
//!     println!("{} resolved to {} ({:?})", result.reference, result.canonical_url, result.source);
//!     Ok(())
//! }
//! ```

// ── Pipeline components ───────────────────────────────────────────────────────
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod reference;
pub mod resolver;

// ── Orchestration and boundary surface ────────────────────────────────────────
pub mod engine;
pub mod navigator;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use engine::{EngineConfig, ResolveOptions, ResolverEngine};
pub use error::ResolveError;
pub use metrics::MetricsSnapshot;
pub use navigator::HybridNavigator;
pub use resolver::{ResolvedResult, Source};
