//! Marketplace adapters.
//!
//! Each adapter knows one upstream API: how to authenticate, which endpoint
//! lists GPU inventory, and how to map the raw records onto the common
//! listing schema. Transports flagged as mocks route onto a canned payload
//! that exercises the same envelope parsing as the live path.

mod akash;
mod ionet;
mod render;
mod vastai;

pub use akash::AkashAdapter;
pub use ionet::IonetAdapter;
pub use render::RenderAdapter;
pub use vastai::VastaiAdapter;

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::SourceAdapter;
use crate::config::{ReliabilityConfig, SourceConfig};
use crate::error::SourceError;
use crate::http_client::{HttpClient, HttpError, HttpResponse};
use crate::source::SourceId;

/// Build the adapter for `config.source` over the given transport.
pub fn build_adapter(
    config: SourceConfig,
    reliability: &ReliabilityConfig,
    client: Arc<dyn HttpClient>,
) -> Arc<dyn SourceAdapter> {
    match config.source {
        SourceId::Vastai => Arc::new(VastaiAdapter::new(config, reliability, client)),
        SourceId::Akash => Arc::new(AkashAdapter::new(config, reliability, client)),
        SourceId::Render => Arc::new(RenderAdapter::new(config, reliability, client)),
        SourceId::Ionet => Arc::new(IonetAdapter::new(config, reliability, client)),
    }
}

/// Map a transport failure onto the source error taxonomy.
pub(crate) fn transport_to_source(source: SourceId, error: HttpError) -> SourceError {
    if error.retryable() {
        SourceError::transient_network(format!("{}: {}", source.display_name(), error.message()))
    } else {
        SourceError::internal(format!("{}: {}", source.display_name(), error.message()))
    }
}

/// Classify a non-2xx status. Auth failures and malformed requests are
/// permanent; rate limits and server-side faults are retryable.
pub(crate) fn classify_status(source: SourceId, response: &HttpResponse) -> SourceError {
    let name = source.display_name();
    match response.status {
        401 | 403 => SourceError::upstream_auth(format!(
            "{name} authentication failed (status {})",
            response.status
        )),
        429 => SourceError::upstream_rate_limited(format!("{name} rate limit exceeded")),
        500..=599 => SourceError::transient_network(format!(
            "{name} upstream error (status {})",
            response.status
        )),
        status => SourceError::invalid_response(format!(
            "{name} unexpected status {status}"
        )),
    }
}

/// Parse `body` and pull the array under `key` out of the envelope.
pub(crate) fn extract_array(source: SourceId, body: &str, key: &str) -> Result<Vec<Value>, SourceError> {
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        SourceError::invalid_response(format!(
            "{} returned malformed JSON: {e}",
            source.display_name()
        ))
    })?;
    match parsed.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(SourceError::invalid_response(format!(
            "{} response missing '{key}' array",
            source.display_name()
        ))),
    }
}

/// Prices are persisted to four decimals, matching upstream quote precision.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_covers_taxonomy() {
        use crate::error::SourceErrorKind;

        let response = |status| HttpResponse {
            status,
            body: String::new(),
        };

        assert_eq!(
            classify_status(SourceId::Vastai, &response(401)).kind(),
            SourceErrorKind::UpstreamAuth
        );
        assert_eq!(
            classify_status(SourceId::Vastai, &response(429)).kind(),
            SourceErrorKind::UpstreamRateLimited
        );
        assert_eq!(
            classify_status(SourceId::Akash, &response(503)).kind(),
            SourceErrorKind::TransientNetwork
        );
        assert_eq!(
            classify_status(SourceId::Render, &response(418)).kind(),
            SourceErrorKind::InvalidResponse
        );
    }

    #[test]
    fn extract_array_rejects_missing_envelope_key() {
        let error = extract_array(SourceId::Vastai, r#"{"items": []}"#, "offers")
            .expect_err("wrong envelope key");
        assert!(error.message().contains("offers"));

        let error =
            extract_array(SourceId::Vastai, "not json", "offers").expect_err("malformed body");
        assert!(error.message().contains("malformed"));
    }

    #[test]
    fn extract_array_returns_envelope_items() {
        let items = extract_array(SourceId::Ionet, r#"{"devices": [1, 2, 3]}"#, "devices")
            .expect("valid envelope");
        assert_eq!(items.len(), 3);
    }
}
