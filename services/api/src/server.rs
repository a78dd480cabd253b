use crate::cli::ServeArgs;
use crate::infra::{AppState, OutboxNotificationPublisher, SimulatedVerificationAdapter};
use crate::routes::with_kyc_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use driver_kyc::config::AppConfig;
use driver_kyc::error::AppError;
use driver_kyc::telemetry;
use driver_kyc::workflows::kyc::{
    verification_channel, AllowListAuthority, KycService, MaintenanceSweeper, MemoryBlobStore,
    MemoryKycStore, RetryPolicy, SystemClock, VerificationWorker,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

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

    if config.kyc.reviewers.is_empty() {
        warn!("KYC_REVIEWERS is empty; every admin review request will be refused");
    }

    let store = Arc::new(MemoryKycStore::default());
    let (queue, jobs) = verification_channel();
    let kyc_service = Arc::new(KycService::new(
        store.clone(),
        Arc::new(OutboxNotificationPublisher::default()),
        Arc::new(MemoryBlobStore::default()),
        Arc::new(AllowListAuthority::new(config.kyc.reviewers.clone())),
        Arc::new(queue),
        config.kyc.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = VerificationWorker::new(
        store,
        Arc::new(SimulatedVerificationAdapter::default()),
        RetryPolicy::from_config(&config.kyc),
        Arc::new(SystemClock),
    );
    let worker_task = tokio::spawn(worker.run(jobs, shutdown_rx.clone()));

    let sweeper = MaintenanceSweeper::new(kyc_service.clone(), config.kyc.sweep_interval);
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let app = with_kyc_routes(kyc_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "driver kyc service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);
    for (name, task) in [("verification worker", worker_task), ("sweeper", sweeper_task)] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task ended abnormally");
        }
    }

    info!("driver kyc service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
