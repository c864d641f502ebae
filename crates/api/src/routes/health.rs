//! Health check endpoints.
//!
//! Both services report `503 Service Unavailable` while their broker
//! connection is down.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use broker::Broker;
use inventory::ProductStore;
use ordering::OrderStore;
use serde::Serialize;

use super::orders::OrderAppState;
use super::products::InventoryAppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker_connected: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHealthResponse {
    pub status: &'static str,
    pub broker_connected: bool,
    pub pending_stock_checks: usize,
}

fn status_of(connected: bool) -> (StatusCode, &'static str) {
    if connected {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    }
}

/// GET /health: inventory service liveness.
pub async fn inventory<B, S>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
) -> (StatusCode, Json<HealthResponse>)
where
    B: Broker,
    S: ProductStore + 'static,
{
    let broker_connected = state.broker.is_connected();
    let (code, status) = status_of(broker_connected);
    (
        code,
        Json(HealthResponse {
            status,
            broker_connected,
        }),
    )
}

/// GET /health: order service liveness and in-flight stock checks.
pub async fn orders<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
) -> (StatusCode, Json<OrderHealthResponse>)
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let broker_connected = state.coordinator.broker().is_connected();
    let (code, status) = status_of(broker_connected);
    (
        code,
        Json(OrderHealthResponse {
            status,
            broker_connected,
            pending_stock_checks: state.coordinator.pending().len(),
        }),
    )
}
