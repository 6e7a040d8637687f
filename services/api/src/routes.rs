use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use evidence_automation::workflows::evidence::{
    evidence_router, AuditSink, EvidenceServices, EvidenceStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_evidence_routes<S, A>(services: Arc<EvidenceServices<S, A>>) -> axum::Router
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    evidence_router(services)
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
    use crate::infra::{ruleset_catalog, Pipeline};
    use axum::body::Body;
    use axum::http::Request;
    use evidence_automation::config::PipelineConfig;
    use evidence_automation::workflows::evidence::{Document, DocumentId, MemoryDocumentStorage};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app_state() -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    fn pipeline(storage: Arc<MemoryDocumentStorage>) -> Pipeline {
        let config = PipelineConfig::default();
        let catalog = ruleset_catalog(&config).expect("default rulesets");
        Pipeline::build(&config, catalog, storage)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_follows_flag() {
        let state = app_state();

        let response = readiness_endpoint(Extension(state.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn service_routes_sit_beside_evidence_routes() {
        let storage = Arc::new(MemoryDocumentStorage::default());
        storage.put(
            "uploads/transcript.txt",
            "OFFICIAL TRANSCRIPT\nACADEMY OF BARBERING - Total Hours Completed: 1200 - State: KY\n",
        );
        let pipeline = pipeline(storage);
        pipeline
            .store
            .insert_document(Document::pending(
                DocumentId::from("doc-ky"),
                "uploads/transcript.txt",
            ))
            .expect("document inserted");
        let app = with_evidence_routes(Arc::new(EvidenceServices::new(pipeline.processor)))
            .layer(Extension(app_state()));

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(health.status(), StatusCode::OK);

        let processed = app
            .oneshot(
                Request::post("/api/v1/documents/doc-ky/process")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(processed.status(), StatusCode::OK);
        let payload = body_json(processed).await;
        assert_eq!(payload["decision"], "approved");
        assert_eq!(payload["extracted_fields"]["state"], "KY");
    }
}
