//! Akash Network adapter.
//!
//! Akash is a blockchain marketplace; inventory is derived from the chain's
//! provider registry (`GET /akash/market/v1beta3/providers`) rather than a
//! direct offer list. Each registered provider is expanded into offerings
//! from a catalog of GPU models commonly deployed on the network, priced at
//! the network's typical discount. No API key: the RPC REST gateway is open.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{SourceAdapter, SourceState};
use crate::config::{ReliabilityConfig, SourceConfig};
use crate::error::SourceError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::listing::{NormalizedListing, ScoreWeights};
use crate::source::SourceId;

use super::{classify_status, extract_array, round4, transport_to_source};

const WEIGHTS: ScoreWeights = ScoreWeights::new(0.3, 0.3, 0.4);

// Decentralized network constants: no per-node telemetry is available from
// the registry, so performance and reliability use network-level estimates.
const NETWORK_PERFORMANCE: f64 = 0.7;
const NETWORK_RELIABILITY: f64 = 0.75;

/// Marketplace discount applied to catalog base prices.
const PRICE_DISCOUNT: f64 = 0.7;

/// Providers expanded per sync and models offered per provider.
const MAX_PROVIDERS: usize = 50;
const MODELS_PER_PROVIDER: usize = 2;

/// GPU models commonly deployed on the network: (model, vram_gb, base $/hr).
const GPU_CATALOG: &[(&str, u32, f64)] = &[
    ("RTX 4090", 24, 1.2),
    ("RTX 3090", 24, 0.9),
    ("A100", 80, 2.5),
    ("V100", 32, 1.8),
    ("RTX A6000", 48, 1.5),
];

pub struct AkashAdapter {
    state: SourceState,
    client: Arc<dyn HttpClient>,
}

impl AkashAdapter {
    pub fn new(
        config: SourceConfig,
        reliability: &ReliabilityConfig,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            state: SourceState::new(config, reliability),
            client,
        }
    }
}

impl SourceAdapter for AkashAdapter {
    fn id(&self) -> SourceId {
        SourceId::Akash
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    fn fetch_raw<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.client.is_mock() {
                return extract_array(SourceId::Akash, SAMPLE_PROVIDERS, "providers");
            }

            let config = self.state.config();
            let url = format!("{}/akash/market/v1beta3/providers", config.base_url);
            let request = HttpRequest::get(url)
                .with_header("content-type", "application/json")
                .with_timeout_ms(config.timeout.as_millis() as u64);

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| transport_to_source(SourceId::Akash, e))?;
            if !response.is_success() {
                return Err(classify_status(SourceId::Akash, &response));
            }

            extract_array(SourceId::Akash, &response.body, "providers")
        })
    }

    fn normalize(&self, raw: &[Value]) -> Vec<NormalizedListing> {
        raw.iter()
            .take(MAX_PROVIDERS)
            .filter_map(|value| match serde_json::from_value::<Provider>(value.clone()) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    debug!(error = %e, "skipping unparseable akash provider");
                    None
                }
            })
            .flat_map(|provider| {
                GPU_CATALOG
                    .iter()
                    .take(MODELS_PER_PROVIDER)
                    .map(move |&(model, vram_gb, base_price)| {
                        provider.offering(model, vram_gb, base_price)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Provider {
    owner: String,
    #[serde(default)]
    attributes: Vec<Attribute>,
}

#[derive(Debug, Deserialize)]
struct Attribute {
    key: String,
    value: String,
}

impl Provider {
    fn region(&self) -> String {
        self.attributes
            .iter()
            .find(|attr| attr.key == "region")
            .map(|attr| attr.value.clone())
            .unwrap_or_else(|| String::from("Global"))
    }

    fn offering(&self, model: &str, vram_gb: u32, base_price: f64) -> NormalizedListing {
        let price = base_price * PRICE_DISCOUNT;
        let score = WEIGHTS.score(NETWORK_PERFORMANCE, NETWORK_RELIABILITY, price);

        NormalizedListing {
            source: SourceId::Akash,
            external_id: format!("{}:{}", self.owner, model.replace(' ', "-").to_lowercase()),
            model: model.to_owned(),
            vram_gb,
            price_per_hour: round4(price),
            available: true,
            location: self.region(),
            reliability: NETWORK_RELIABILITY,
            score,
        }
    }
}

const SAMPLE_PROVIDERS: &str = r#"{
  "providers": [
    {"owner": "akash1qqzw4c7f8yp2r3s4t5u6v7w8x9y0z1a2b3c4d5",
     "host_uri": "https://provider.europlots.com:8443",
     "attributes": [{"key": "region", "value": "eu-west"},
                    {"key": "tier", "value": "community"}]},
    {"owner": "akash1mn0pqrs7tuv8wx9yz0ab1cd2ef3gh4ij5kl6mn",
     "host_uri": "https://provider.hurricane.dev:8443",
     "attributes": [{"key": "region", "value": "us-central"}]},
    {"owner": "akash1zz9yyxx8ww7vv6uu5tt4ss3rr2qq1pp0oo9nn8",
     "host_uri": "https://d3akash.cloud:8443",
     "attributes": []}
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::NoopHttpClient;

    fn adapter() -> AkashAdapter {
        AkashAdapter::new(
            SourceConfig::defaults(SourceId::Akash),
            &ReliabilityConfig::default(),
            Arc::new(NoopHttpClient),
        )
    }

    #[tokio::test]
    async fn mock_transport_serves_sample_providers() {
        let adapter = adapter();
        let raw = adapter.fetch_raw().await.expect("sample payload parses");
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn each_provider_expands_to_two_offerings() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Akash, SAMPLE_PROVIDERS, "providers").unwrap();
        let listings = adapter.normalize(&raw);

        assert_eq!(listings.len(), 6);
        assert_eq!(listings[0].model, "RTX 4090");
        assert_eq!(listings[1].model, "RTX 3090");
        assert_eq!(listings[0].location, "eu-west");
        // Missing region attribute falls back to Global.
        assert_eq!(listings[4].location, "Global");
    }

    #[test]
    fn offerings_carry_discounted_prices_and_network_score() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Akash, SAMPLE_PROVIDERS, "providers").unwrap();
        let listings = adapter.normalize(&raw);

        // 1.2 base with the 30% discount.
        assert!((listings[0].price_per_hour - 0.84).abs() < 1e-9);
        // perf 0.7 * 0.3 + rel 0.75 * 0.3 + capped efficiency 1.0 * 0.4
        assert!((listings[0].score - 83.5).abs() < 0.001);
    }

    #[test]
    fn external_ids_are_unique_per_provider_and_model() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Akash, SAMPLE_PROVIDERS, "providers").unwrap();
        let listings = adapter.normalize(&raw);

        let mut ids: Vec<_> = listings.iter().map(|l| l.external_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), listings.len());
    }
}
