use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

use crate::source::SourceId;

/// Classification of a failed source call.
///
/// The kind decides retry behavior: transient network faults and upstream
/// rate limits are retried, auth failures and malformed payloads are not,
/// and circuit-open rejections fail fast with a `retry_after` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    TransientNetwork,
    UpstreamAuth,
    UpstreamRateLimited,
    CircuitOpen,
    RateLimitWaitTimeout,
    InvalidResponse,
    NotRegistered,
    Internal,
}

/// Structured error for a single source call.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl SourceError {
    pub fn transient_network(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::TransientNetwork,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn upstream_auth(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::UpstreamAuth,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn upstream_rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::UpstreamRateLimited,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn circuit_open(source: SourceId, retry_after: Duration) -> Self {
        Self {
            kind: SourceErrorKind::CircuitOpen,
            message: format!(
                "circuit breaker open for '{source}', retry after {:.1}s",
                retry_after.as_secs_f64()
            ),
            retryable: false,
            retry_after: Some(retry_after),
        }
    }

    pub fn rate_limit_wait_timeout(source: SourceId, wait: Duration) -> Self {
        Self {
            kind: SourceErrorKind::RateLimitWaitTimeout,
            message: format!(
                "rate limit wait for '{source}' exceeds budget, retry after {:.2}s",
                wait.as_secs_f64()
            ),
            retryable: false,
            retry_after: Some(wait),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidResponse,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn not_registered(name: &str) -> Self {
        Self {
            kind: SourceErrorKind::NotRegistered,
            message: format!("source '{name}' is not registered"),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Hint for when the caller may try again (circuit open / wait timeout).
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::TransientNetwork => "source.transient_network",
            SourceErrorKind::UpstreamAuth => "source.upstream_auth",
            SourceErrorKind::UpstreamRateLimited => "source.upstream_rate_limited",
            SourceErrorKind::CircuitOpen => "source.circuit_open",
            SourceErrorKind::RateLimitWaitTimeout => "source.rate_limit_wait_timeout",
            SourceErrorKind::InvalidResponse => "source.invalid_response",
            SourceErrorKind::NotRegistered => "source.not_registered",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Aggregator-internal misconfiguration. Individual source failures are
/// never surfaced through this type; they become per-source outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("no sources registered")]
    NoSourcesRegistered,
}

/// Configuration loading and validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown source '{value}', expected one of vastai, akash, render, ionet")]
    UnknownSource { value: String },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("rate limit for '{source_id}' must be greater than zero")]
    ZeroRateLimit { source_id: SourceId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_carries_retry_after() {
        let error = SourceError::circuit_open(SourceId::Vastai, Duration::from_secs(42));

        assert_eq!(error.kind(), SourceErrorKind::CircuitOpen);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(42)));
        assert!(!error.retryable());
        assert!(error.message().contains("vastai"));
    }

    #[test]
    fn retryability_follows_kind() {
        assert!(SourceError::transient_network("timeout").retryable());
        assert!(SourceError::upstream_rate_limited("429").retryable());
        assert!(!SourceError::upstream_auth("401").retryable());
        assert!(!SourceError::invalid_response("bad json").retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SourceError::upstream_auth("x").code(), "source.upstream_auth");
        assert_eq!(
            SourceError::rate_limit_wait_timeout(SourceId::Akash, Duration::from_secs(1)).code(),
            "source.rate_limit_wait_timeout"
        );
    }
}
