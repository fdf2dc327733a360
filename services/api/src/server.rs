use crate::cli::ServeArgs;
use crate::infra::{seeded_store, AppState};
use crate::routes::with_subsidy_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use subsidy_review::config::AppConfig;
use subsidy_review::error::AppError;
use subsidy_review::telemetry;
use subsidy_review::workflows::subsidy::SubsidyWorkflow;
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

    let store = seeded_store(&config.budget)?;
    let workflow = Arc::new(SubsidyWorkflow::new(store, config.review));

    let app = with_subsidy_routes(workflow)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_commit_attempts = config.review.max_commit_attempts,
        "subsidy review service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
