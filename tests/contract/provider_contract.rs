//! Contract checks every marketplace adapter must satisfy in mock mode:
//! fetch succeeds offline, normalization is deterministic, scores stay on
//! the 0-100 scale, and fresh adapters report healthy.

use std::sync::Arc;

use gpumesh_core::{
    build_adapter, HealthState, NoopHttpClient, ReliabilityConfig, SourceAdapter, SourceConfig,
    SourceId,
};

fn mock_adapter(source: SourceId) -> Arc<dyn SourceAdapter> {
    build_adapter(
        SourceConfig::defaults(source),
        &ReliabilityConfig::default(),
        Arc::new(NoopHttpClient),
    )
}

#[tokio::test]
async fn every_adapter_fetches_sample_data_offline() {
    for source in SourceId::ALL {
        let adapter = mock_adapter(source);
        assert_eq!(adapter.id(), source);

        let raw = adapter.fetch_raw().await.unwrap_or_else(|e| {
            panic!("{source} mock fetch failed: {e}");
        });
        assert!(!raw.is_empty(), "{source} sample payload is empty");
    }
}

#[tokio::test]
async fn normalization_produces_complete_listings() {
    for source in SourceId::ALL {
        let adapter = mock_adapter(source);
        let raw = adapter.fetch_raw().await.expect("mock fetch succeeds");
        let listings = adapter.normalize(&raw);

        assert!(!listings.is_empty(), "{source} normalized to nothing");
        for listing in &listings {
            assert_eq!(listing.source, source);
            assert!(!listing.external_id.is_empty(), "{source} missing id");
            assert!(!listing.model.is_empty(), "{source} missing model");
            assert!(listing.price_per_hour >= 0.0);
            assert!(
                (0.0..=100.0).contains(&listing.score),
                "{source} score {} out of range",
                listing.score
            );
            assert!((0.0..=1.0).contains(&listing.reliability));
        }
    }
}

#[tokio::test]
async fn normalization_is_deterministic() {
    for source in SourceId::ALL {
        let adapter = mock_adapter(source);
        let raw = adapter.fetch_raw().await.expect("mock fetch succeeds");

        let first = adapter.normalize(&raw);
        let second = adapter.normalize(&raw);
        assert_eq!(first, second, "{source} normalization is not stable");
    }
}

#[tokio::test]
async fn external_ids_are_unique_within_a_source() {
    for source in SourceId::ALL {
        let adapter = mock_adapter(source);
        let raw = adapter.fetch_raw().await.expect("mock fetch succeeds");
        let listings = adapter.normalize(&raw);

        let mut ids: Vec<_> = listings.iter().map(|l| l.external_id.as_str()).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before, "{source} has duplicate external ids");
    }
}

#[test]
fn fresh_adapters_start_healthy() {
    for source in SourceId::ALL {
        let adapter = mock_adapter(source);
        assert_eq!(adapter.health(), HealthState::Healthy, "{source}");

        let snapshot = adapter.state().health_snapshot();
        assert_eq!(snapshot.source, source);
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.success_rate, 1.0);
    }
}
