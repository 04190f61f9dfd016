use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemorySessionStore, TracingEventSink};
use crate::routes::with_queue_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use notaria_queue::config::AppConfig;
use notaria_queue::error::AppError;
use notaria_queue::queue::{
    AdmissionQueue, ExpirationSweeper, InMemoryTenantConfigs, SystemClock,
};
use notaria_queue::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let tenants = config.queue.tenants()?;
    info!(tenants = tenants.len(), "tenant queue configuration loaded");
    let queue = Arc::new(
        AdmissionQueue::new(
            Arc::new(InMemorySessionStore::default()),
            Arc::new(InMemoryTenantConfigs::new(tenants)),
            Arc::new(TracingEventSink),
            Arc::new(SystemClock::new()),
        )
        .with_store_timeout(config.queue.store_timeout),
    );

    let app = with_queue_routes(queue.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    queue.recover().await?;

    let shutdown = install_signal_handler();
    let sweeper = ExpirationSweeper::new(queue, config.queue.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.child_token()));

    readiness_flag.store(true, Ordering::Release);
    info!(
        ?config.environment,
        %addr,
        sweep_interval_secs = config.queue.sweep_interval.as_secs(),
        "notaría session queue ready"
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    // The server may also stop on its own; make sure the sweeper follows it.
    shutdown.cancel();
    if let Err(err) = sweeper_task.await {
        warn!(error = %err, "expiry sweeper task ended abnormally");
    }
    info!("notaría session queue stopped");
    Ok(())
}

/// Cancels the returned token on Ctrl+C or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
                        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                    }
                }
                Err(err) => {
                    warn!(error = %err, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("received Ctrl+C, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, shutting down");
        }

        trigger.cancel();
    });

    token
}
