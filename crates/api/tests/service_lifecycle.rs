//! Service run loops stop when their broker side goes away.

use std::time::Duration;

use api::config::{Config, Service};
use api::error::StartupError;
use api::server::{run_inventory_service, run_order_service};
use broker::{Broker, InMemoryBroker};
use common::DEFAULT_STOCK_QUEUE;
use inventory::{InMemoryProductStore, InventoryError};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use ordering::InMemoryOrderStore;
use tokio::task::JoinHandle;

fn metrics_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn test_config(service: Service) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        worker_concurrency: 2,
        broker_check_interval: Duration::from_millis(20),
        ..Config::defaults(service)
    }
}

fn start_inventory(broker: &InMemoryBroker) -> JoinHandle<Result<(), StartupError>> {
    let broker = broker.clone();
    tokio::spawn(async move {
        let config = test_config(Service::Inventory);
        run_inventory_service(&config, broker, InMemoryProductStore::new(), metrics_handle()).await
    })
}

async fn wait_for_stock_queue(broker: &InMemoryBroker) {
    while !broker.queue_exists(DEFAULT_STOCK_QUEUE) {
        tokio::task::yield_now().await;
    }
    // Let the workers attach their consumers.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn finished(service: JoinHandle<Result<(), StartupError>>) -> Result<(), StartupError> {
    tokio::time::timeout(Duration::from_secs(2), service)
        .await
        .expect("service should stop")
        .unwrap()
}

#[tokio::test]
async fn inventory_service_stops_when_stock_queue_is_deleted() {
    let broker = InMemoryBroker::new();
    let service = start_inventory(&broker);
    wait_for_stock_queue(&broker).await;

    broker.delete_queue(DEFAULT_STOCK_QUEUE).await.unwrap();

    let result = finished(service).await;
    assert!(matches!(
        result,
        Err(StartupError::Inventory(InventoryError::ConsumerCancelled(_)))
    ));
}

#[tokio::test]
async fn inventory_service_stops_when_broker_connection_is_lost() {
    let broker = InMemoryBroker::new();
    let service = start_inventory(&broker);
    wait_for_stock_queue(&broker).await;

    broker.set_connected(false);

    assert!(finished(service).await.is_err());
}

#[tokio::test]
async fn order_service_stops_when_broker_connection_is_lost() {
    let broker = InMemoryBroker::new();
    let service = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let config = test_config(Service::Orders);
            run_order_service(&config, broker, InMemoryOrderStore::new(), metrics_handle()).await
        })
    };
    wait_for_stock_queue(&broker).await;

    broker.set_connected(false);

    let result = finished(service).await;
    assert!(matches!(result, Err(StartupError::BrokerConnectionLost)));
}
