//! Service run loops with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use broker::Broker;
use inventory::{ProductStore, ReservationWorker};
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::{OrderCoordinator, OrderStore};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::StartupError;
use crate::routes::orders::OrderAppState;
use crate::routes::products::InventoryAppState;
use crate::{create_inventory_app, create_order_app};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Polls the broker connection every `interval` and cancels `shutdown` once
/// it is lost.
///
/// Returns true if the connection was lost, false if `shutdown` fired first.
pub async fn watch_connection<B: Broker>(
    broker: B,
    interval: Duration,
    shutdown: CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return false,
            () = tokio::time::sleep(interval) => {}
        }
        if !broker.is_connected() {
            tracing::error!("broker connection lost, shutting down");
            shutdown.cancel();
            return true;
        }
    }
}

/// Waits for a shutdown signal or for `shutdown` to be cancelled.
async fn shutdown_requested(shutdown: CancellationToken) {
    tokio::select! {
        () = shutdown_signal() => {}
        () = shutdown.cancelled() => {}
    }
}

/// Serves the order service until a shutdown signal arrives or the broker
/// connection is lost.
///
/// New placements are refused once shutdown starts; placements already
/// waiting for a stock check reply are allowed to finish.
pub async fn run_order_service<B, S>(
    config: &Config,
    broker: B,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let shutdown = CancellationToken::new();
    let watchdog = tokio::spawn(watch_connection(
        broker.clone(),
        config.broker_check_interval,
        shutdown.clone(),
    ));
    let _stop_on_exit = shutdown.clone().drop_guard();

    let coordinator = OrderCoordinator::new(broker, store, config.coordinator_config());
    coordinator.declare_stock_queue().await?;

    let state = Arc::new(OrderAppState { coordinator });
    let app = create_order_app(state.clone(), metrics_handle);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "starting order service");

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_requested(token).await;
            state.coordinator.close();
        })
        .await?;

    shutdown.cancel();
    if matches!(watchdog.await, Ok(true)) {
        return Err(StartupError::BrokerConnectionLost);
    }

    tracing::info!("order service shut down gracefully");
    Ok(())
}

/// Runs the reservation workers and serves the inventory service until a
/// shutdown signal arrives, a worker stops or the broker connection is lost.
pub async fn run_inventory_service<B, S>(
    config: &Config,
    broker: B,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError>
where
    B: Broker + Clone + 'static,
    S: ProductStore + Clone + 'static,
{
    broker.declare_queue(&config.stock_queue).await?;

    let shutdown = CancellationToken::new();
    let watchdog = tokio::spawn(watch_connection(
        broker.clone(),
        config.broker_check_interval,
        shutdown.clone(),
    ));
    let _stop_on_exit = shutdown.clone().drop_guard();

    let mut workers = JoinSet::new();
    for _ in 0..config.worker_concurrency {
        let worker =
            ReservationWorker::new(broker.clone(), store.clone(), config.stock_queue.clone());
        let token = shutdown.clone();
        workers.spawn(async move {
            let result = worker.run(token.clone()).await;
            // Whatever ended this worker ends the service.
            token.cancel();
            result
        });
    }
    tracing::info!(
        workers = config.worker_concurrency,
        queue = %config.stock_queue,
        "reservation workers started"
    );

    let state = Arc::new(InventoryAppState { broker, store });
    let app = create_inventory_app(state, metrics_handle);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "starting inventory service");

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(token))
        .await?;

    shutdown.cancel();
    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "reservation worker failed");
                failure.get_or_insert(e);
            }
            Err(e) => tracing::error!(error = %e, "reservation worker panicked"),
        }
    }

    let connection_lost = matches!(watchdog.await, Ok(true));
    match failure {
        Some(e) => Err(e.into()),
        None if connection_lost => Err(StartupError::BrokerConnectionLost),
        None => {
            tracing::info!("inventory service shut down gracefully");
            Ok(())
        }
    }
}
