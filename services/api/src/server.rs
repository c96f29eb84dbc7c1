use crate::cli::ServeArgs;
use crate::infra::{build_walk_stack, AppState};
use crate::routes::with_walk_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use mipaseo::config::AppConfig;
use mipaseo::error::AppError;
use mipaseo::telemetry;
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
    if let Some(seed_csv) = args.seed_csv.take() {
        config.service.seed_csv = Some(seed_csv);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stack = build_walk_stack(&config.service);
    if let Some(path) = config.service.seed_csv.as_deref() {
        stack.seed_from(path)?;
    }

    let app = with_walk_routes(stack.api.clone(), config.service.request_timeout())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "walk booking service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
