//! Source registry and sync aggregation.
//!
//! The registry owns every adapter plus the shared listing cache and the
//! canonical merged listing vector. `sync_all` fans out one task per source
//! and contains each failure in that source's outcome; the merged result
//! combines fresh listings with last-good cached listings for sources that
//! failed, so one flaky marketplace never blanks the aggregate view.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapter::{HealthState, SourceAdapter, SourceHealthSnapshot};
use crate::cache::{AdaptiveCache, CacheStats};
use crate::circuit_breaker::CircuitBreakerSnapshot;
use crate::config::ReliabilityConfig;
use crate::error::{AggregatorError, SourceError};
use crate::listing::{sort_canonical, NormalizedListing};
use crate::metrics::SourceMetricsSnapshot;
use crate::rate_limit::RateLimiterSnapshot;
use crate::retry::RetryController;
use crate::source::SourceId;

/// Result of one source's participation in a sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Synced { listings: usize, latency_ms: u64 },
    Failed { code: &'static str, message: String },
    TimedOut,
}

/// Aggregate result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub total_listings: usize,
    pub duration_ms: u64,
    pub outcomes: BTreeMap<SourceId, SourceOutcome>,
}

/// Service-wide health: per-source views plus a rolled-up status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub sources: Vec<SourceHealthSnapshot>,
}

/// Combined call metrics across all sources.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub sources: BTreeMap<SourceId, SourceMetricsSnapshot>,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub overall_success_rate: f64,
}

/// Registry of marketplace adapters and the canonical merged listings.
pub struct SourceRegistry {
    reliability: ReliabilityConfig,
    adapters: RwLock<BTreeMap<SourceId, Arc<dyn SourceAdapter>>>,
    cache: Arc<AdaptiveCache>,
    listings: RwLock<Arc<Vec<NormalizedListing>>>,
    last_summary: Mutex<Option<SyncSummary>>,
}

impl SourceRegistry {
    pub fn new(reliability: ReliabilityConfig) -> Self {
        let cache = Arc::new(AdaptiveCache::new(reliability.cache));
        Self {
            reliability,
            adapters: RwLock::new(BTreeMap::new()),
            cache,
            listings: RwLock::new(Arc::new(Vec::new())),
            last_summary: Mutex::new(None),
        }
    }

    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) {
        let source = adapter.id();
        self.adapters
            .write()
            .expect("registry lock is not poisoned")
            .insert(source, adapter);
        info!(source = %source, "registered source adapter");
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters
            .read()
            .expect("registry lock is not poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Sources currently classified as healthy.
    pub fn healthy_sources(&self) -> Vec<SourceId> {
        self.snapshot_adapters()
            .into_iter()
            .filter(|adapter| adapter.health() == HealthState::Healthy)
            .map(|adapter| adapter.id())
            .collect()
    }

    /// Current canonical ranked listings. The vector is replaced wholesale
    /// on every sync; readers keep whatever snapshot they grabbed.
    pub fn listings(&self) -> Arc<Vec<NormalizedListing>> {
        Arc::clone(&self.listings.read().expect("registry lock is not poisoned"))
    }

    pub fn last_summary(&self) -> Option<SyncSummary> {
        self.last_summary
            .lock()
            .expect("registry lock is not poisoned")
            .clone()
    }

    /// Sync every enabled source concurrently and swap in the merged result.
    ///
    /// `deadline` bounds the whole run (defaults to the configured sync
    /// deadline); sources still running when it expires are recorded as
    /// timed out and their tasks aborted, without touching their per-source
    /// reliability state.
    pub async fn sync_all(
        &self,
        deadline: Option<Duration>,
    ) -> Result<SyncSummary, AggregatorError> {
        let adapters = self.snapshot_adapters();
        if adapters.is_empty() {
            return Err(AggregatorError::NoSourcesRegistered);
        }

        let started = Instant::now();
        let enabled: Vec<_> = adapters
            .into_iter()
            .filter(|adapter| adapter.state().config().enabled)
            .collect();
        let enabled_ids: Vec<SourceId> = enabled.iter().map(|a| a.id()).collect();

        let mut join_set = JoinSet::new();
        for adapter in enabled {
            let controller =
                RetryController::new(self.reliability.retry_for(adapter.state().config()));
            let cache = Arc::clone(&self.cache);
            join_set.spawn(async move {
                let source = adapter.id();
                let fetch_started = Instant::now();
                match guarded_fetch(&adapter, &controller).await {
                    Ok(listings) => {
                        let latency_ms = fetch_started.elapsed().as_millis() as u64;
                        let rate = adapter.state().metrics().success_rate();
                        cache.set(source, listings.clone(), rate);
                        (source, Ok((listings, latency_ms)))
                    }
                    Err(error) => (source, Err(error)),
                }
            });
        }

        let deadline_at =
            tokio::time::Instant::now() + deadline.unwrap_or(self.reliability.sync_deadline);
        let mut outcomes: BTreeMap<SourceId, SourceOutcome> = BTreeMap::new();
        let mut fresh: BTreeMap<SourceId, Vec<NormalizedListing>> = BTreeMap::new();

        while !join_set.is_empty() {
            match tokio::time::timeout_at(deadline_at, join_set.join_next()).await {
                Ok(Some(Ok((source, Ok((listings, latency_ms)))))) => {
                    outcomes.insert(
                        source,
                        SourceOutcome::Synced {
                            listings: listings.len(),
                            latency_ms,
                        },
                    );
                    fresh.insert(source, listings);
                }
                Ok(Some(Ok((source, Err(error))))) => {
                    warn!(source = %source, error = %error, "source sync failed");
                    outcomes.insert(
                        source,
                        SourceOutcome::Failed {
                            code: error.code(),
                            message: error.message().to_owned(),
                        },
                    );
                }
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "source sync task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    join_set.abort_all();
                    break;
                }
            }
        }

        for source in &enabled_ids {
            outcomes.entry(*source).or_insert(SourceOutcome::TimedOut);
        }

        // Stale-while-revalidate merge: fresh results win, failed sources
        // fall back to their last good cached listings.
        let mut merged: Vec<NormalizedListing> = Vec::new();
        for source in &enabled_ids {
            if let Some(listings) = fresh.remove(source) {
                merged.extend(listings);
            } else if let Some(cached) = self.cache.get_allow_stale(*source) {
                merged.extend(cached.listings.iter().cloned());
            }
        }
        sort_canonical(&mut merged);
        let total_listings = merged.len();
        *self.listings.write().expect("registry lock is not poisoned") = Arc::new(merged);

        let sources_succeeded = outcomes
            .values()
            .filter(|o| matches!(o, SourceOutcome::Synced { .. }))
            .count();
        let summary = SyncSummary {
            sources_succeeded,
            sources_failed: outcomes.len() - sources_succeeded,
            total_listings,
            duration_ms: started.elapsed().as_millis() as u64,
            outcomes,
        };
        info!(
            succeeded = summary.sources_succeeded,
            failed = summary.sources_failed,
            listings = summary.total_listings,
            duration_ms = summary.duration_ms,
            "sync completed"
        );
        *self
            .last_summary
            .lock()
            .expect("registry lock is not poisoned") = Some(summary.clone());
        Ok(summary)
    }

    /// Overall status rolls up per-source health: healthy only when every
    /// source is, unavailable when none are.
    pub fn health_report(&self) -> HealthReport {
        let sources: Vec<SourceHealthSnapshot> = self
            .snapshot_adapters()
            .iter()
            .map(|adapter| adapter.state().health_snapshot())
            .collect();

        let healthy = sources
            .iter()
            .filter(|s| s.status == HealthState::Healthy)
            .count();
        let status = if sources.is_empty() || healthy == 0 {
            HealthState::Unavailable
        } else if healthy == sources.len() {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };

        HealthReport { status, sources }
    }

    pub fn source_health(&self, name: &str) -> Result<SourceHealthSnapshot, SourceError> {
        Ok(self.lookup(name)?.state().health_snapshot())
    }

    /// Run one guarded fetch against a source right now and report its
    /// health afterwards. Refreshes the cache on success.
    pub async fn health_check(&self, name: &str) -> Result<SourceHealthSnapshot, SourceError> {
        let adapter = self.lookup(name)?;
        let controller =
            RetryController::new(self.reliability.retry_for(adapter.state().config()));

        match guarded_fetch(&adapter, &controller).await {
            Ok(listings) => {
                let rate = adapter.state().metrics().success_rate();
                self.cache.set(adapter.id(), listings, rate);
            }
            Err(error) => {
                warn!(source = %adapter.id(), error = %error, "manual health check failed");
            }
        }
        Ok(adapter.state().health_snapshot())
    }

    pub fn circuit_breaker_stats(&self) -> BTreeMap<SourceId, CircuitBreakerSnapshot> {
        self.snapshot_adapters()
            .iter()
            .map(|adapter| (adapter.id(), adapter.state().breaker().snapshot()))
            .collect()
    }

    pub fn reset_circuit_breaker(&self, name: &str) -> Result<CircuitBreakerSnapshot, SourceError> {
        let adapter = self.lookup(name)?;
        adapter.state().breaker().reset();
        info!(source = %adapter.id(), "circuit breaker manually reset");
        Ok(adapter.state().breaker().snapshot())
    }

    pub fn rate_limiter_stats(&self) -> BTreeMap<SourceId, RateLimiterSnapshot> {
        self.snapshot_adapters()
            .iter()
            .map(|adapter| (adapter.id(), adapter.state().limiter().snapshot()))
            .collect()
    }

    pub fn reset_rate_limiters(&self) {
        for adapter in self.snapshot_adapters() {
            adapter.state().limiter().reset();
        }
        info!("rate limiters reset to full capacity");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Invalidate one source's cached listings, or everything when `source`
    /// is `None`.
    pub fn invalidate_cache(&self, source: Option<SourceId>) {
        match source {
            Some(source) => self.cache.invalidate(source),
            None => self.cache.invalidate_all(),
        }
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        let sources: BTreeMap<SourceId, SourceMetricsSnapshot> = self
            .snapshot_adapters()
            .iter()
            .map(|adapter| (adapter.id(), adapter.state().metrics().snapshot()))
            .collect();

        let total_calls: u64 = sources.values().map(|s| s.total_calls).sum();
        let total_successes: u64 = sources.values().map(|s| s.total_successes).sum();
        let total_failures: u64 = sources.values().map(|s| s.total_failures).sum();
        let overall_success_rate = if total_calls == 0 {
            1.0
        } else {
            total_successes as f64 / total_calls as f64
        };

        MetricsSummary {
            sources,
            total_calls,
            total_successes,
            total_failures,
            overall_success_rate,
        }
    }

    fn snapshot_adapters(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters
            .read()
            .expect("registry lock is not poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn SourceAdapter>, SourceError> {
        let source: SourceId = name.parse().map_err(|_| SourceError::not_registered(name))?;
        self.adapters
            .read()
            .expect("registry lock is not poisoned")
            .get(&source)
            .cloned()
            .ok_or_else(|| SourceError::not_registered(name))
    }
}

/// One reliability-guarded fetch-and-normalize pass for a source.
async fn guarded_fetch(
    adapter: &Arc<dyn SourceAdapter>,
    controller: &RetryController,
) -> Result<Vec<NormalizedListing>, SourceError> {
    let state = adapter.state();
    let raw = controller
        .run(
            adapter.id(),
            state.limiter(),
            state.breaker(),
            state.metrics(),
            || adapter.fetch_raw(),
        )
        .await?;
    Ok(adapter.normalize(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::build_adapter;
    use crate::config::SourceConfig;
    use crate::http_client::NoopHttpClient;

    fn mock_registry(sources: &[SourceId]) -> SourceRegistry {
        let reliability = ReliabilityConfig::default();
        let registry = SourceRegistry::new(reliability.clone());
        for &source in sources {
            let adapter = build_adapter(
                SourceConfig::defaults(source),
                &reliability,
                Arc::new(NoopHttpClient),
            );
            registry.register(adapter);
        }
        registry
    }

    #[tokio::test]
    async fn sync_without_sources_is_a_configuration_error() {
        let registry = SourceRegistry::new(ReliabilityConfig::default());
        let error = registry.sync_all(None).await.expect_err("nothing registered");
        assert_eq!(error, AggregatorError::NoSourcesRegistered);
    }

    #[tokio::test]
    async fn sync_merges_all_mock_sources_in_canonical_order() {
        let registry = mock_registry(&SourceId::ALL);

        let summary = registry.sync_all(None).await.expect("mock sync succeeds");
        assert_eq!(summary.sources_succeeded, 4);
        assert_eq!(summary.sources_failed, 0);
        assert!(summary.total_listings > 0);

        let listings = registry.listings();
        assert_eq!(listings.len(), summary.total_listings);
        for pair in listings.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn disabled_sources_are_skipped() {
        let reliability = ReliabilityConfig::default();
        let registry = SourceRegistry::new(reliability.clone());
        let mut config = SourceConfig::defaults(SourceId::Vastai);
        config.enabled = false;
        registry.register(build_adapter(config, &reliability, Arc::new(NoopHttpClient)));
        registry.register(build_adapter(
            SourceConfig::defaults(SourceId::Ionet),
            &reliability,
            Arc::new(NoopHttpClient),
        ));

        let summary = registry.sync_all(None).await.expect("sync succeeds");
        assert!(!summary.outcomes.contains_key(&SourceId::Vastai));
        assert!(summary.outcomes.contains_key(&SourceId::Ionet));
    }

    #[tokio::test]
    async fn all_mock_sources_start_healthy() {
        let registry = mock_registry(&SourceId::ALL);
        assert_eq!(registry.healthy_sources().len(), 4);
        assert_eq!(registry.health_report().status, HealthState::Healthy);
    }

    #[test]
    fn unknown_source_names_are_rejected() {
        let registry = mock_registry(&[SourceId::Vastai]);

        assert!(registry.source_health("lambda").is_err());
        // Valid name but never registered.
        assert!(registry.source_health("akash").is_err());
        assert!(registry.source_health("vastai").is_ok());
    }

    #[tokio::test]
    async fn breaker_reset_through_registry() {
        let registry = mock_registry(&[SourceId::Render]);
        let adapter = registry.lookup("render").expect("registered");
        for _ in 0..5 {
            adapter.state().breaker().record_failure();
        }
        assert!(!adapter.state().breaker().is_call_permitted());

        let snapshot = registry
            .reset_circuit_breaker("render")
            .expect("reset succeeds");
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(adapter.state().breaker().is_call_permitted());
    }

    #[tokio::test]
    async fn manual_health_check_records_a_call() {
        let registry = mock_registry(&[SourceId::Akash]);

        let snapshot = registry.health_check("akash").await.expect("check runs");
        assert_eq!(snapshot.total_calls, 1);
        assert_eq!(snapshot.status, HealthState::Healthy);
    }
}
