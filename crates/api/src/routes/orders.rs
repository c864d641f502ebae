//! Order placement and order CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use broker::Broker;
use common::{OrderId, ProductId};
use ordering::{Order, OrderCoordinator, OrderStatus, OrderStore, OrderUpdate, PlaceOrder};
use serde::Deserialize;

use crate::error::ApiError;

/// Shared state of the order service.
pub struct OrderAppState<B, S> {
    pub coordinator: OrderCoordinator<B, S>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
    pub status: Option<OrderStatus>,
}

impl UpdateOrderRequest {
    fn into_update(self) -> Result<OrderUpdate, ApiError> {
        let quantity = self
            .quantity
            .map(|q| {
                u32::try_from(q).map_err(|_| {
                    ApiError::BadRequest(format!("quantity must be a positive integer, got {q}"))
                })
            })
            .transpose()?;

        Ok(OrderUpdate {
            product_id: self.product_id.map(ProductId::new),
            quantity,
            status: self.status,
        })
    }
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .map(OrderId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid order ID: {id}")))
}

/// POST /orders: confirm stock with the inventory service, then store the order.
#[tracing::instrument(skip(state, payload))]
pub async fn create<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
    payload: Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let Json(request) = payload?;
    let order = state.coordinator.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
) -> Result<Json<Vec<Order>>, ApiError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    Ok(Json(state.coordinator.store().list().await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let order_id = parse_order_id(&id)?;
    state
        .coordinator
        .store()
        .get(order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

/// PUT /orders/{id}: partial update; stock is not re-checked.
#[tracing::instrument(skip(state, payload))]
pub async fn update<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let order_id = parse_order_id(&id)?;
    let Json(request) = payload?;
    let update = request.into_update()?;

    state
        .coordinator
        .store()
        .update(order_id, update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))
}

/// DELETE /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<B, S>(
    State(state): State<Arc<OrderAppState<B, S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    B: Broker + Clone + 'static,
    S: OrderStore + 'static,
{
    let order_id = parse_order_id(&id)?;
    if state.coordinator.store().delete(order_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Order {id} not found")))
    }
}
