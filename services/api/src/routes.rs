use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use driver_kyc::workflows::kyc::{kyc_router, KycService, KycStore, NotificationPublisher};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_kyc_routes<S, N>(service: Arc<KycService<S, N>>) -> axum::Router
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    kyc_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::OutboxNotificationPublisher;
    use axum::body::Body;
    use axum::http::Request;
    use driver_kyc::config::KycConfig;
    use driver_kyc::workflows::kyc::{
        verification_channel, AllowListAuthority, MemoryBlobStore, MemoryKycStore,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app_state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        }
    }

    fn service() -> Arc<KycService<MemoryKycStore, OutboxNotificationPublisher>> {
        let (queue, _jobs) = verification_channel();
        Arc::new(KycService::new(
            Arc::new(MemoryKycStore::default()),
            Arc::new(OutboxNotificationPublisher::default()),
            Arc::new(MemoryBlobStore::default()),
            Arc::new(AllowListAuthority::default()),
            Arc::new(queue),
            KycConfig::default(),
        ))
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let state = app_state(false);

        let response = readiness_endpoint(Extension(state.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn operational_routes_sit_beside_kyc_routes() {
        let app = with_kyc_routes(service()).layer(Extension(app_state(true)));

        let health = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(health.status(), StatusCode::OK);

        let status = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/drivers/drv-ops/kyc")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(status.status(), StatusCode::OK);
    }
}
