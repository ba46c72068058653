//! Core contracts for gpumesh.
//!
//! This crate contains:
//! - Canonical source identifiers and the normalized listing schema
//! - Per-source reliability primitives (rate limiter, circuit breaker,
//!   metrics, adaptive cache, retry controller)
//! - Marketplace adapters (Vast.ai, Akash Network, Render Network, io.net)
//! - The source registry and concurrent sync aggregation
//! - A background sync scheduler

pub mod adapter;
pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http_client;
pub mod listing;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod source;

pub use adapter::{HealthState, SourceAdapter, SourceHealthSnapshot, SourceState};
pub use adapters::{build_adapter, AkashAdapter, IonetAdapter, RenderAdapter, VastaiAdapter};
pub use cache::{AdaptiveCache, CacheConfig, CacheStats, CachedListings, SourceCacheStats};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use config::{ReliabilityConfig, SourceConfig};
pub use error::{AggregatorError, ConfigError, SourceError, SourceErrorKind};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient,
};
pub use listing::{sort_canonical, NormalizedListing, ScoreWeights};
pub use metrics::{SourceMetrics, SourceMetricsSnapshot};
pub use rate_limit::{RateLimitError, RateLimiterSnapshot, TokenBucket};
pub use registry::{HealthReport, MetricsSummary, SourceOutcome, SourceRegistry, SyncSummary};
pub use retry::{BackoffPolicy, RetryConfig, RetryController};
pub use scheduler::SyncScheduler;
pub use source::SourceId;
