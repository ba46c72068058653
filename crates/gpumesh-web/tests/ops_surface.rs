use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use gpumesh_core::{
    build_adapter, NoopHttpClient, ReliabilityConfig, SourceConfig, SourceId, SourceRegistry,
};
use gpumesh_web::create_router;

fn mock_app() -> (Router, Arc<SourceRegistry>) {
    let reliability = ReliabilityConfig::default();
    let registry = Arc::new(SourceRegistry::new(reliability.clone()));
    for source in SourceId::ALL {
        registry.register(build_adapter(
            SourceConfig::defaults(source),
            &reliability,
            Arc::new(NoopHttpClient),
        ));
    }
    (create_router(Arc::clone(&registry)), registry)
}

fn empty_app() -> Router {
    create_router(Arc::new(SourceRegistry::new(ReliabilityConfig::default())))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("body fits the limit");
    serde_json::from_slice(&bytes).expect("response is JSON")
}

#[tokio::test]
async fn health_reports_all_mock_sources_healthy() {
    let (app, _) = mock_app();

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["sources"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn health_without_registered_sources_is_unavailable() {
    let response = empty_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_provider_names_return_not_found() {
    let (app, _) = mock_app();

    let response = app
        .clone()
        .oneshot(
            Request::get("/providers/lambda/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::post("/circuit-breakers/lambda/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_health_and_manual_check() {
    let (app, _) = mock_app();

    let response = app
        .clone()
        .oneshot(
            Request::get("/providers/vastai/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["source"], "vastai");
    assert_eq!(json["status"], "healthy");

    let response = app
        .oneshot(
            Request::post("/providers/vastai/health-check")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total_calls"], 1);
}

#[tokio::test]
async fn manual_sync_populates_listings() {
    let (app, _) = mock_app();

    let response = app
        .clone()
        .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["sources_succeeded"], 4);
    assert_eq!(summary["sources_failed"], 0);

    let response = app
        .oneshot(Request::get("/listings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let total = json["total"].as_u64().unwrap();
    assert!(total > 0);
    assert_eq!(json["listings"].as_array().unwrap().len(), total as usize);
}

#[tokio::test]
async fn sync_without_sources_is_service_unavailable() {
    let response = empty_app()
        .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "aggregator.no_sources");
}

#[tokio::test]
async fn breaker_reset_returns_closed_snapshot() {
    let (app, _registry) = mock_app();

    let response = app
        .oneshot(
            Request::post("/circuit-breakers/render/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["state"], "closed");
    assert_eq!(json["trip_count"], 0);
}

#[tokio::test]
async fn reliability_stat_endpoints_respond() {
    let (app, _) = mock_app();

    for path in ["/circuit-breakers", "/rate-limiters", "/cache/stats", "/metrics/summary"] {
        let response = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
    }

    let response = app
        .oneshot(
            Request::post("/rate-limiters/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cache_invalidate_validates_provider_param() {
    let (app, _) = mock_app();

    let response = app
        .clone()
        .oneshot(
            Request::post("/cache/invalidate?provider=vastai")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::post("/cache/invalidate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::post("/cache/invalidate?provider=lambda")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
