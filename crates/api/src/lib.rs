//! HTTP services for stock-checked order placement.
//!
//! Two services share this crate:
//! - the order service places orders through an [`ordering::OrderCoordinator`]
//!   and serves order CRUD
//! - the inventory service runs [`inventory::ReservationWorker`]s on the
//!   stock queue and serves product CRUD
//!
//! Both expose `/health` and a Prometheus `/metrics` endpoint and log through
//! `tracing`.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use broker::{AmqpBroker, Broker, BrokerError};
use inventory::ProductStore;
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::OrderAppState;
use routes::products::InventoryAppState;

/// Creates the order service router.
pub fn create_order_app<B, S>(
    state: Arc<OrderAppState<B, S>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    Router::new()
        .route("/health", get(routes::health::orders::<B, S>))
        .route(
            "/orders",
            get(routes::orders::list::<B, S>).post(routes::orders::create::<B, S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<B, S>)
                .put(routes::orders::update::<B, S>)
                .delete(routes::orders::delete::<B, S>),
        )
        .with_state(state)
        .merge(metrics_router(metrics_handle))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

/// Creates the inventory service router.
pub fn create_inventory_app<B, S>(
    state: Arc<InventoryAppState<B, S>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    B: Broker,
    S: ProductStore + 'static,
{
    Router::new()
        .route("/health", get(routes::health::inventory::<B, S>))
        .route(
            "/products",
            get(routes::products::list::<B, S>).post(routes::products::create::<B, S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<B, S>)
                .put(routes::products::update::<B, S>)
                .delete(routes::products::delete::<B, S>),
        )
        .with_state(state)
        .merge(metrics_router(metrics_handle))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

fn metrics_router(metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Connects to the AMQP broker named in `config`.
#[tracing::instrument(skip(config), fields(service = config.service.name()))]
pub async fn connect_broker(config: &Config) -> Result<AmqpBroker, BrokerError> {
    let broker = AmqpBroker::connect(&config.amqp_url, config.amqp_options()).await?;
    tracing::info!("connected to message broker");
    Ok(broker)
}
