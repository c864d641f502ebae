use broker::{Broker, InMemoryBroker, MessageProperties, Subscription};
use common::{CorrelationId, DEFAULT_STOCK_QUEUE, StockCheckRequest};
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InMemoryProductStore, NewProduct, ProductStore, Reservation, ReservationWorker};

fn bench_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryProductStore::new();
    let product = rt
        .block_on(store.create(NewProduct::new("Widget", u32::MAX)))
        .unwrap();

    c.bench_function("inventory/reserve", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = Reservation::new(CorrelationId::generate(), product.id, 1);
                store.reserve(&reservation).await.unwrap();
            });
        });
    });
}

fn bench_reserve_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryProductStore::new();
    let product = rt
        .block_on(store.create(NewProduct::new("Widget", 10)))
        .unwrap();
    let reservation = Reservation::new(CorrelationId::generate(), product.id, 1);
    rt.block_on(store.reserve(&reservation)).unwrap();

    c.bench_function("inventory/reserve_replay", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.reserve(&reservation).await.unwrap();
            });
        });
    });
}

fn bench_worker_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = InMemoryBroker::new();
    let store = InMemoryProductStore::new();
    let worker = ReservationWorker::new(broker.clone(), store.clone(), DEFAULT_STOCK_QUEUE);

    let (product, reply_queue) = rt.block_on(async {
        broker.declare_queue(DEFAULT_STOCK_QUEUE).await.unwrap();
        let product = store
            .create(NewProduct::new("Widget", u32::MAX))
            .await
            .unwrap();
        (product, broker.declare_exclusive_queue().await.unwrap())
    });
    let mut requests = rt.block_on(broker.consume(DEFAULT_STOCK_QUEUE)).unwrap();
    let mut replies = rt.block_on(broker.consume(&reply_queue)).unwrap();

    c.bench_function("inventory/worker_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let correlation_id = CorrelationId::generate();
                let request =
                    StockCheckRequest::new(product.id, 1, &reply_queue, correlation_id.clone());
                broker
                    .publish(
                        DEFAULT_STOCK_QUEUE,
                        request.encode().unwrap(),
                        MessageProperties::new().with_correlation_id(correlation_id.as_str()),
                    )
                    .await
                    .unwrap();

                let delivery = requests.next().await.unwrap().unwrap();
                worker.handle(delivery).await;
                replies.next().await.unwrap().unwrap().ack().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve,
    bench_reserve_replay,
    bench_worker_round_trip
);
criterion_main!(benches);
