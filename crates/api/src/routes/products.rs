//! Product CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use broker::Broker;
use common::ProductId;
use inventory::{NewProduct, Product, ProductStore, ProductUpdate};
use serde::Deserialize;

use crate::error::ApiError;

/// Shared state of the inventory service.
pub struct InventoryAppState<B, S> {
    pub broker: B,
    pub store: S,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: u32,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(req: CreateProductRequest) -> Self {
        NewProduct {
            name: req.name,
            description: req.description,
            price_cents: req.price_cents,
            stock: req.stock,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<u32>,
}

impl From<UpdateProductRequest> for ProductUpdate {
    fn from(req: UpdateProductRequest) -> Self {
        ProductUpdate {
            name: req.name,
            description: req.description,
            price_cents: req.price_cents,
            stock: req.stock,
        }
    }
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    id.parse::<i64>()
        .ok()
        .map(ProductId::new)
        .filter(ProductId::is_well_formed)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid product ID: {id}")))
}

/// POST /products
#[tracing::instrument(skip(state, payload))]
pub async fn create<B: Broker, S: ProductStore + 'static>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(request) = payload?;
    let product = state.store.create(request.into()).await?;
    tracing::info!(product_id = %product.id, stock = product.stock, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products
#[tracing::instrument(skip(state))]
pub async fn list<B: Broker, S: ProductStore + 'static>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B: Broker, S: ProductStore + 'static>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_product_id(&id)?;
    state
        .store
        .get(product_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// PUT /products/{id}: partial update; a `stock` value replaces the count.
#[tracing::instrument(skip(state, payload))]
pub async fn update<B: Broker, S: ProductStore + 'static>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let Json(request) = payload?;

    state
        .store
        .update(product_id, request.into())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// DELETE /products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<B: Broker, S: ProductStore + 'static>(
    State(state): State<Arc<InventoryAppState<B, S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&id)?;
    if state.store.delete(product_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Product {id} not found")))
    }
}
