//! HTTP ops surface over the source registry.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use gpumesh_core::{
    AggregatorError, SourceError, SourceErrorKind, SourceId, SourceRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
}

pub fn create_router(registry: Arc<SourceRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(get_health))
        .route("/providers/:name/health", get(get_provider_health))
        .route("/providers/:name/health-check", post(post_health_check))
        .route("/circuit-breakers", get(get_circuit_breakers))
        .route("/circuit-breakers/:name/reset", post(post_breaker_reset))
        .route("/rate-limiters", get(get_rate_limiters))
        .route("/rate-limiters/reset", post(post_rate_limiters_reset))
        .route("/cache/stats", get(get_cache_stats))
        .route("/cache/invalidate", post(post_cache_invalidate))
        .route("/metrics/summary", get(get_metrics_summary))
        .route("/listings", get(get_listings))
        .route("/sync", post(post_sync))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API error rendered as `{"error": {"code", "message"}}`.
struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(error: SourceError) -> Self {
        let status = match error.kind() {
            SourceErrorKind::NotRegistered => StatusCode::NOT_FOUND,
            SourceErrorKind::UpstreamAuth => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: error.code().to_owned(),
            message: error.message().to_owned(),
        }
    }
}

impl From<AggregatorError> for ApiError {
    fn from(error: AggregatorError) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: String::from("aggregator.no_sources"),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": {"code": self.code, "message": self.message}});
        (self.status, Json(body)).into_response()
    }
}

async fn get_health(State(state): State<AppState>) -> Result<Response, ApiError> {
    if state.registry.sources().is_empty() {
        return Err(AggregatorError::NoSourcesRegistered.into());
    }
    Ok(Json(state.registry.health_report()).into_response())
}

async fn get_provider_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.registry.source_health(&name)?;
    Ok(Json(snapshot).into_response())
}

async fn post_health_check(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.registry.health_check(&name).await?;
    Ok(Json(snapshot).into_response())
}

async fn get_circuit_breakers(State(state): State<AppState>) -> Response {
    Json(state.registry.circuit_breaker_stats()).into_response()
}

async fn post_breaker_reset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.registry.reset_circuit_breaker(&name)?;
    Ok(Json(snapshot).into_response())
}

async fn get_rate_limiters(State(state): State<AppState>) -> Response {
    Json(state.registry.rate_limiter_stats()).into_response()
}

async fn post_rate_limiters_reset(State(state): State<AppState>) -> Response {
    state.registry.reset_rate_limiters();
    Json(json!({"status": "ok"})).into_response()
}

async fn get_cache_stats(State(state): State<AppState>) -> Response {
    Json(state.registry.cache_stats()).into_response()
}

#[derive(Debug, Deserialize)]
struct InvalidateParams {
    provider: Option<String>,
}

async fn post_cache_invalidate(
    State(state): State<AppState>,
    Query(params): Query<InvalidateParams>,
) -> Result<Response, ApiError> {
    let source = match params.provider.as_deref() {
        Some(name) => Some(name.parse::<SourceId>().map_err(|_| {
            ApiError::not_found("source.not_registered", format!("unknown provider '{name}'"))
        })?),
        None => None,
    };
    state.registry.invalidate_cache(source);
    Ok(Json(json!({"status": "ok"})).into_response())
}

async fn get_metrics_summary(State(state): State<AppState>) -> Response {
    Json(state.registry.metrics_summary()).into_response()
}

async fn get_listings(State(state): State<AppState>) -> Response {
    let listings = state.registry.listings();
    Json(json!({"total": listings.len(), "listings": &*listings})).into_response()
}

async fn post_sync(State(state): State<AppState>) -> Result<Response, ApiError> {
    let summary = state.registry.sync_all(None).await?;
    Ok(Json(summary).into_response())
}
