//! io.net adapter.
//!
//! Devices come from `GET /devices` filtered to verified, available
//! hardware. Devices report a performance score and a provider reputation
//! on 0-100 scales; cluster-ready devices get a score boost since they can
//! join distributed workloads.

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

/// Multiplier for cluster-ready devices.
const CLUSTER_BOOST: f64 = 1.1;

pub struct IonetAdapter {
    state: SourceState,
    client: Arc<dyn HttpClient>,
}

impl IonetAdapter {
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

impl SourceAdapter for IonetAdapter {
    fn id(&self) -> SourceId {
        SourceId::Ionet
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    fn fetch_raw<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.client.is_mock() {
                return extract_array(SourceId::Ionet, SAMPLE_DEVICES, "devices");
            }

            let config = self.state.config();
            let url = format!(
                "{}/devices?status=available&verified=true&limit=1000",
                config.base_url
            );
            let request = HttpRequest::get(url)
                .with_auth(&self.auth())
                .with_header("content-type", "application/json")
                .with_timeout_ms(config.timeout.as_millis() as u64);

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| transport_to_source(SourceId::Ionet, e))?;
            if !response.is_success() {
                return Err(classify_status(SourceId::Ionet, &response));
            }

            extract_array(SourceId::Ionet, &response.body, "devices")
        })
    }

    fn normalize(&self, raw: &[Value]) -> Vec<NormalizedListing> {
        raw.iter()
            .filter_map(|value| match serde_json::from_value::<Device>(value.clone()) {
                Ok(device) => Some(device.into_listing()),
                Err(e) => {
                    debug!(error = %e, "skipping unparseable io.net device");
                    None
                }
            })
            .collect()
    }
}

/// Device ids arrive as either strings or integers depending on API version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceId {
    Text(String),
    Numeric(i64),
}

impl DeviceId {
    fn into_string(self) -> String {
        match self {
            Self::Text(id) => id,
            Self::Numeric(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Device {
    device_id: DeviceId,
    #[serde(default = "unknown")]
    gpu_model: String,
    #[serde(default)]
    gpu_memory: u32,
    #[serde(default)]
    price_per_hour: f64,
    #[serde(default)]
    availability: String,
    #[serde(default = "unknown")]
    location: String,
    #[serde(default)]
    cluster_ready: bool,
    #[serde(default = "default_performance")]
    performance_score: f64,
    #[serde(default = "default_reputation")]
    provider_reputation: f64,
}

fn unknown() -> String {
    String::from("Unknown")
}

fn default_performance() -> f64 {
    50.0
}

fn default_reputation() -> f64 {
    80.0
}

impl Device {
    fn into_listing(self) -> NormalizedListing {
        let performance = self.performance_score / 100.0;
        let reliability = self.provider_reputation / 100.0;

        let mut score = WEIGHTS.score(performance, reliability, self.price_per_hour);
        if self.cluster_ready {
            score = round2((score * CLUSTER_BOOST).min(100.0));
        }

        NormalizedListing {
            source: SourceId::Ionet,
            external_id: self.device_id.into_string(),
            model: self.gpu_model,
            vram_gb: self.gpu_memory,
            price_per_hour: round4(self.price_per_hour),
            available: self.availability == "available",
            location: self.location,
            reliability,
            score,
        }
    }
}

const SAMPLE_DEVICES: &str = r#"{
  "devices": [
    {"device_id": "io-dev-44812", "gpu_model": "H100 PCIe", "gpu_memory": 80,
     "price_per_hour": 1.5, "availability": "available", "location": "US-East",
     "cluster_ready": true, "performance_score": 90, "provider_reputation": 95},
    {"device_id": 77120, "gpu_model": "RTX 4090", "gpu_memory": 24,
     "price_per_hour": 0.45, "availability": "available", "location": "Singapore",
     "cluster_ready": false, "performance_score": 72, "provider_reputation": 88},
    {"device_id": "io-dev-90233", "gpu_model": "A40", "gpu_memory": 48,
     "price_per_hour": 0.7, "availability": "busy", "location": "France",
     "cluster_ready": true, "performance_score": 60, "provider_reputation": 82}
  ],
  "total": 3
}"#;
