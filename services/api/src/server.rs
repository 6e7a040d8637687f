use crate::cli::ServeArgs;
use crate::infra::{ruleset_catalog, AppState, Pipeline};
use crate::routes::with_evidence_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use evidence_automation::config::AppConfig;
use evidence_automation::error::AppError;
use evidence_automation::telemetry;
use evidence_automation::workflows::evidence::{EvidenceServices, FilesystemStorage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = ruleset_catalog(&config.pipeline)?;
    let storage = Arc::new(FilesystemStorage::new(config.pipeline.document_root.clone()));
    let pipeline = Pipeline::build(&config.pipeline, catalog, storage);
    let services = Arc::new(EvidenceServices::new(pipeline.processor));

    let app = with_evidence_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        document_root = %config.pipeline.document_root.display(),
        "evidence automation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
