//! Render Network adapter.
//!
//! Nodes come from `GET /nodes` (active nodes, all tiers). Render prices per
//! OctaneBench-hour, so the normalized hourly price scales the OBh rate by
//! the node's benchmark score. Nodes advertising AI capabilities get a small
//! score boost; tiers above 3 are treated as unavailable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{SourceAdapter, SourceState};
use crate::config::{ReliabilityConfig, SourceConfig};
use crate::error::SourceError;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::listing::{round2, NormalizedListing, ScoreWeights};
use crate::source::SourceId;

use super::{classify_status, extract_array, round4, transport_to_source};

const WEIGHTS: ScoreWeights = ScoreWeights::new(0.5, 0.3, 0.2);

/// Multiplier for nodes advertising AI/ML capabilities.
const AI_BOOST: f64 = 1.05;

pub struct RenderAdapter {
    state: SourceState,
    client: Arc<dyn HttpClient>,
}

impl RenderAdapter {
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

    fn auth(&self) -> HttpAuth {
        match self.state.config().api_key.clone() {
            Some(key) => HttpAuth::BearerToken(key),
            None => HttpAuth::None,
        }
    }
}

impl SourceAdapter for RenderAdapter {
    fn id(&self) -> SourceId {
        SourceId::Render
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    fn fetch_raw<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.client.is_mock() {
                return extract_array(SourceId::Render, SAMPLE_NODES, "nodes");
            }

            let config = self.state.config();
            let url = format!("{}/nodes?status=active&tier=all", config.base_url);
            let request = HttpRequest::get(url)
                .with_auth(&self.auth())
                .with_header("content-type", "application/json")
                .with_timeout_ms(config.timeout.as_millis() as u64);

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| transport_to_source(SourceId::Render, e))?;
            if !response.is_success() {
                return Err(classify_status(SourceId::Render, &response));
            }

            extract_array(SourceId::Render, &response.body, "nodes")
        })
    }

    fn normalize(&self, raw: &[Value]) -> Vec<NormalizedListing> {
        raw.iter()
            .filter_map(|value| match serde_json::from_value::<Node>(value.clone()) {
                Ok(node) => Some(node.into_listing()),
                Err(e) => {
                    debug!(error = %e, "skipping unparseable render node");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Node {
    node_id: String,
    #[serde(default = "unknown")]
    gpu_model: String,
    #[serde(default)]
    gpu_memory: u32,
    #[serde(default = "default_octanebench")]
    octanebench_score: f64,
    #[serde(default = "default_tier")]
    tier: u32,
    #[serde(default = "default_price_per_obh")]
    price_per_obh: f64,
    #[serde(default = "unknown")]
    location: String,
    #[serde(default)]
    ai_capabilities: Vec<String>,
    #[serde(default = "default_uptime")]
    uptime: f64,
    #[serde(default = "default_reputation")]
    reputation: f64,
}

fn unknown() -> String {
    String::from("Unknown")
}

fn default_octanebench() -> f64 {
    100.0
}

fn default_tier() -> u32 {
    3
}

fn default_price_per_obh() -> f64 {
    0.01
}

fn default_uptime() -> f64 {
    95.0
}

fn default_reputation() -> f64 {
    80.0
}

impl Node {
    fn into_listing(self) -> NormalizedListing {
        // A score of 1000+ OctaneBench is top-end.
        let performance = self.octanebench_score / 1000.0;
        let reliability = (self.uptime / 100.0 + self.reputation / 100.0) / 2.0;
        let price_per_hour = self.price_per_obh * self.octanebench_score / 100.0;

        let mut score = WEIGHTS.score(performance, reliability, price_per_hour);
        if !self.ai_capabilities.is_empty() {
            score = round2((score * AI_BOOST).min(100.0));
        }

        NormalizedListing {
            source: SourceId::Render,
            external_id: self.node_id,
            model: self.gpu_model,
            vram_gb: self.gpu_memory,
            price_per_hour: round4(price_per_hour),
            available: self.tier <= 3,
            location: self.location,
            reliability,
            score,
        }
    }
}

const SAMPLE_NODES: &str = r#"{
  "nodes": [
    {"node_id": "rndr-node-7f3a", "gpu_model": "RTX 4090", "gpu_memory": 24,
     "octanebench_score": 600, "tier": 1, "price_per_obh": 0.002,
     "location": "US-West", "ai_capabilities": ["stable-diffusion", "runway"],
     "uptime": 98, "reputation": 90},
    {"node_id": "rndr-node-2b81", "gpu_model": "RTX 3080 Ti", "gpu_memory": 12,
     "octanebench_score": 380, "tier": 2, "price_per_obh": 0.0015,
     "location": "Netherlands", "ai_capabilities": [],
     "uptime": 96, "reputation": 84},
    {"node_id": "rndr-node-9c04", "gpu_model": "GTX 1080", "gpu_memory": 8,
     "octanebench_score": 120, "tier": 4, "price_per_obh": 0.001,
     "location": "Brazil", "ai_capabilities": [],
     "uptime": 88, "reputation": 70}
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::NoopHttpClient;

    fn adapter() -> RenderAdapter {
        RenderAdapter::new(
            SourceConfig::defaults(SourceId::Render),
            &ReliabilityConfig::default(),
            Arc::new(NoopHttpClient),
        )
    }

    #[tokio::test]
    async fn mock_transport_serves_sample_nodes() {
        let adapter = adapter();
        let raw = adapter.fetch_raw().await.expect("sample payload parses");
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn obh_pricing_converts_to_hourly() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Render, SAMPLE_NODES, "nodes").unwrap();
        let listings = adapter.normalize(&raw);

        // 0.002 $/OBh at 600 OctaneBench.
        assert!((listings[0].price_per_hour - 0.012).abs() < 1e-9);
    }

    #[test]
    fn ai_capable_nodes_get_boosted_score() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Render, SAMPLE_NODES, "nodes").unwrap();
        let listings = adapter.normalize(&raw);

        // Base: perf 0.6 * 0.5 + rel 0.94 * 0.3 + efficiency 1.0 * 0.2 = 78.2,
        // then the 5% AI boost.
        assert!((listings[0].score - 82.11).abs() < 0.001);
        // No AI capabilities, no boost.
        let base = WEIGHTS.score(0.38, 0.90, 0.0057);
        assert!((listings[1].score - base).abs() < 0.001);
    }

    #[test]
    fn high_tier_nodes_are_unavailable() {
        let adapter = adapter();
        let raw = extract_array(SourceId::Render, SAMPLE_NODES, "nodes").unwrap();
        let listings = adapter.normalize(&raw);

        assert!(listings[0].available);
        assert!(listings[1].available);
        assert!(!listings[2].available);
    }
}
