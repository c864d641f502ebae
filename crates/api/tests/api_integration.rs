//! Integration tests for the order and inventory HTTP services.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::routes::orders::OrderAppState;
use api::routes::products::InventoryAppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use broker::InMemoryBroker;
use common::DEFAULT_STOCK_QUEUE;
use inventory::{InMemoryProductStore, ReservationWorker};
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::{CoordinatorConfig, InMemoryOrderStore, OrderCoordinator};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            api::telemetry::install_metrics().expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct Services {
    orders: Router,
    products: Router,
    broker: InMemoryBroker,
    shutdown: CancellationToken,
}

impl Drop for Services {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn setup_with(config: CoordinatorConfig, workers: usize) -> Services {
    let broker = InMemoryBroker::new();
    let products = InMemoryProductStore::new();

    let coordinator = OrderCoordinator::new(broker.clone(), InMemoryOrderStore::new(), config);
    coordinator.declare_stock_queue().await.unwrap();

    let shutdown = CancellationToken::new();
    for _ in 0..workers {
        let worker = ReservationWorker::new(broker.clone(), products.clone(), DEFAULT_STOCK_QUEUE);
        let token = shutdown.clone();
        tokio::spawn(async move { worker.run(token).await });
    }

    let metrics_handle = get_metrics_handle();
    Services {
        orders: api::create_order_app(
            Arc::new(OrderAppState { coordinator }),
            metrics_handle.clone(),
        ),
        products: api::create_inventory_app(
            Arc::new(InventoryAppState {
                broker: broker.clone(),
                store: products,
            }),
            metrics_handle,
        ),
        broker,
        shutdown,
    }
}

async fn setup() -> Services {
    setup_with(CoordinatorConfig::default(), 1).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_product(services: &Services, stock: u32) -> i64 {
    let (status, json) = send(
        &services.products,
        "POST",
        "/products",
        Some(serde_json::json!({ "name": "Widget", "stock": stock, "priceCents": 1299 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_checks() {
    let services = setup().await;

    let (status, json) = send(&services.orders, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["brokerConnected"], true);
    assert_eq!(json["pendingStockChecks"], 0);

    let (status, json) = send(&services.products, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["brokerConnected"], true);
}

#[tokio::test]
async fn test_health_reports_lost_broker_connection() {
    let services = setup().await;
    services.broker.set_connected(false);

    for app in [&services.orders, &services.products] {
        let (status, json) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["brokerConnected"], false);
    }

    services.broker.set_connected(true);
    let (status, _) = send(&services.orders, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_place_order_then_run_out_of_stock() {
    let services = setup().await;
    let product_id = create_product(&services, 5).await;

    let (status, order) = send(
        &services.orders,
        "POST",
        "/orders",
        Some(serde_json::json!({ "productId": product_id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["productId"], product_id);
    assert_eq!(order["quantity"], 3);
    assert_eq!(order["status"], "pending");

    let (_, product) = send(
        &services.products,
        "GET",
        &format!("/products/{product_id}"),
        None,
    )
    .await;
    assert_eq!(product["stock"], 2);

    let (status, error) = send(
        &services.orders,
        "POST",
        "/orders",
        Some(serde_json::json!({ "productId": product_id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("Insufficient stock"));

    let (_, product) = send(
        &services.products,
        "GET",
        &format!("/products/{product_id}"),
        None,
    )
    .await;
    assert_eq!(product["stock"], 2);

    let (_, orders) = send(&services.orders, "GET", "/orders", None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(services.broker.exclusive_queue_count(), 0);
}

#[tokio::test]
async fn test_invalid_order_requests() {
    let services = setup().await;

    for body in [
        serde_json::json!({ "productId": 1, "quantity": 0 }),
        serde_json::json!({ "productId": 1, "quantity": -1 }),
        serde_json::json!({ "productId": 0, "quantity": 1 }),
        serde_json::json!({ "productId": 1 }),
        serde_json::json!({ "productId": "one", "quantity": 1 }),
    ] {
        let (status, json) = send(&services.orders, "POST", "/orders", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    assert_eq!(services.broker.published_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let services = setup().await;

    let response = services
        .orders
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stock_check_timeout_is_gateway_timeout() {
    let config = CoordinatorConfig::default().with_reply_timeout(Duration::from_millis(50));
    let services = setup_with(config, 0).await;

    let (status, json) = send(
        &services.orders,
        "POST",
        "/orders",
        Some(serde_json::json!({ "productId": 1, "quantity": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(services.broker.exclusive_queue_count(), 0);

    let (_, health) = send(&services.orders, "GET", "/health", None).await;
    assert_eq!(health["pendingStockChecks"], 0);
}

#[tokio::test]
async fn test_order_crud() {
    let services = setup().await;
    let product_id = create_product(&services, 10).await;

    let (_, order) = send(
        &services.orders,
        "POST",
        "/orders",
        Some(serde_json::json!({ "productId": product_id, "quantity": 1 })),
    )
    .await;
    let id = order["id"].as_i64().unwrap();

    let (status, fetched) = send(&services.orders, "GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);

    let (status, updated) = send(
        &services.orders,
        "PUT",
        &format!("/orders/{id}"),
        Some(serde_json::json!({ "status": "rejected" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "rejected");
    assert_eq!(updated["quantity"], 1);

    let (status, _) = send(
        &services.orders,
        "PUT",
        &format!("/orders/{id}"),
        Some(serde_json::json!({ "status": "shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&services.orders, "DELETE", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&services.orders, "GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));

    let (status, _) = send(&services.orders, "GET", "/orders/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_crud() {
    let services = setup().await;
    let id = create_product(&services, 4).await;

    let (status, products) = send(&services.products, "GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(products.as_array().unwrap().len(), 1);
    assert_eq!(products[0]["priceCents"], 1299);

    let (status, updated) = send(
        &services.products,
        "PUT",
        &format!("/products/{id}"),
        Some(serde_json::json!({ "stock": 40, "description": "Restocked" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["stock"], 40);
    assert_eq!(updated["name"], "Widget");
    assert_eq!(updated["description"], "Restocked");

    let (status, _) = send(
        &services.products,
        "POST",
        "/products",
        Some(serde_json::json!({ "name": "", "stock": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &services.products,
        "POST",
        "/products",
        Some(serde_json::json!({ "name": "Gadget", "stock": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&services.products, "DELETE", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&services.products, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let services = setup().await;
    let product_id = create_product(&services, 1).await;
    send(
        &services.orders,
        "POST",
        "/orders",
        Some(serde_json::json!({ "productId": product_id, "quantity": 1 })),
    )
    .await;

    let response = services
        .orders
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_placed_total"));
}
