//! Vast.ai adapter.
//!
//! Inventory comes from `GET /bundles` (on-demand offers, score-ordered).
//! Offers report deep-learning performance (`dlperf`), a reliability score
//! in [0, 1], and an hourly price; VRAM arrives in megabytes.

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
use crate::listing::{NormalizedListing, ScoreWeights};
use crate::source::SourceId;

use super::{classify_status, extract_array, round4, transport_to_source};

const WEIGHTS: ScoreWeights = ScoreWeights::new(0.4, 0.4, 0.2);

pub struct VastaiAdapter {
    state: SourceState,
    client: Arc<dyn HttpClient>,
}

impl VastaiAdapter {
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

impl SourceAdapter for VastaiAdapter {
    fn id(&self) -> SourceId {
        SourceId::Vastai
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    fn fetch_raw<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.client.is_mock() {
                return extract_array(SourceId::Vastai, SAMPLE_OFFERS, "offers");
            }

            let config = self.state.config();
            let url = format!("{}/bundles?order=score-&type=on-demand", config.base_url);
            let request = HttpRequest::get(url)
                .with_auth(&self.auth())
                .with_timeout_ms(config.timeout.as_millis() as u64);

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| transport_to_source(SourceId::Vastai, e))?;
            if !response.is_success() {
                return Err(classify_status(SourceId::Vastai, &response));
            }

            extract_array(SourceId::Vastai, &response.body, "offers")
        })
    }

    fn normalize(&self, raw: &[Value]) -> Vec<NormalizedListing> {
        raw.iter()
            .filter_map(|value| match serde_json::from_value::<Offer>(value.clone()) {
                Ok(offer) => Some(offer.into_listing()),
                Err(e) => {
                    debug!(error = %e, "skipping unparseable vast.ai offer");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Offer {
    id: i64,
    #[serde(default = "unknown")]
    gpu_name: String,
    /// VRAM in megabytes.
    #[serde(default)]
    gpu_ram: f64,
    #[serde(default)]
    dph_total: f64,
    #[serde(default)]
    dlperf: f64,
    #[serde(default = "default_reliability")]
    reliability2: f64,
    #[serde(default = "unknown")]
    geolocation: String,
}

fn unknown() -> String {
    String::from("Unknown")
}

fn default_reliability() -> f64 {
    0.5
}

impl Offer {
    fn into_listing(self) -> NormalizedListing {
        let performance = self.dlperf / 100.0;
        let score = WEIGHTS.score(performance, self.reliability2, self.dph_total);

        NormalizedListing {
            source: SourceId::Vastai,
            external_id: self.id.to_string(),
            model: self.gpu_name,
            vram_gb: (self.gpu_ram / 1024.0) as u32,
            price_per_hour: round4(self.dph_total),
            available: true,
            location: self.geolocation,
            reliability: self.reliability2,
            score,
        }
    }
}

const SAMPLE_OFFERS: &str = r#"{
  "offers": [
    {"id": 501234, "gpu_name": "RTX 4090", "gpu_ram": 24576, "dph_total": 0.4,
     "dlperf": 80.0, "reliability2": 0.95, "geolocation": "US-East"},
    {"id": 50188, "gpu_name": "RTX 3090", "gpu_ram": 24576, "dph_total": 0.28,
     "dlperf": 52.0, "reliability2": 0.91, "geolocation": "Germany"},
    {"id": 502777, "gpu_name": "A100 SXM4", "gpu_ram": 81920, "dph_total": 1.65,
     "dlperf": 160.0, "reliability2": 0.99, "geolocation": "Norway"}
  ]
}"#;
