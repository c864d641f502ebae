//! Stock check consumer.

use broker::{Broker, Delivery, MessageProperties, Subscription};
use common::{CorrelationId, StockCheckReply, StockCheckRequest};
use tokio_util::sync::CancellationToken;

use crate::store::{ProductStore, Reservation};
use crate::{InventoryError, Result};

/// Consumes stock check requests and answers each one on its reply queue.
///
/// A request is acknowledged only after its reply was published. If the
/// worker dies in between, the broker redelivers the request and the store's
/// reservation ledger keeps the second attempt from reserving again.
///
/// Several workers may consume the same queue; the store serializes their
/// reservations.
#[derive(Clone)]
pub struct ReservationWorker<B, S> {
    broker: B,
    store: S,
    queue: String,
}

impl<B, S> ReservationWorker<B, S>
where
    B: Broker,
    S: ProductStore,
{
    /// Creates a worker consuming `queue`.
    pub fn new(broker: B, store: S, queue: impl Into<String>) -> Self {
        Self {
            broker,
            store,
            queue: queue.into(),
        }
    }

    /// Returns the queue this worker consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns the product store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the stock queue until `shutdown` fires.
    ///
    /// Failures while handling a single message are logged and never end the
    /// loop. Broker errors on the subscription are returned, and so is
    /// [`InventoryError::ConsumerCancelled`] if the broker ends the consumer
    /// (the queue was deleted, for instance): a worker that stops consuming
    /// without being asked to is a failure.
    #[tracing::instrument(skip(self, shutdown), fields(queue = %self.queue))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.broker.declare_queue(&self.queue).await?;
        let mut subscription = self.broker.consume(&self.queue).await?;
        tracing::info!("reservation worker started");

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("reservation worker stopping");
                    break;
                }
                next = subscription.next() => next?,
            };

            match next {
                Some(delivery) => self.handle(delivery).await,
                None => {
                    tracing::error!("stock queue consumer cancelled by broker");
                    return Err(InventoryError::ConsumerCancelled(self.queue.clone()));
                }
            }
        }

        Ok(())
    }

    /// Processes one delivery and settles it with the broker.
    pub async fn handle(&self, delivery: Delivery) {
        let delivery_tag = delivery.delivery_tag;

        let settled = match self.process(&delivery).await {
            Ok(()) => delivery.ack().await,
            Err(InventoryError::Malformed(reason)) => {
                tracing::warn!(delivery_tag, %reason, "discarding stock check request");
                metrics::counter!("stock_requests_discarded_total").increment(1);
                delivery.reject().await
            }
            Err(e) => {
                tracing::error!(delivery_tag, error = %e, "stock check reply failed, requeueing");
                delivery.requeue().await
            }
        };

        if let Err(e) = settled {
            tracing::error!(delivery_tag, error = %e, "failed to settle stock check request");
        }
    }

    /// Decides a stock check and publishes the reply, without settling the
    /// delivery.
    pub async fn process(&self, delivery: &Delivery) -> Result<()> {
        let request = StockCheckRequest::decode(&delivery.payload)
            .map_err(|e| InventoryError::Malformed(e.to_string()))?;

        let correlation_id = delivery
            .properties
            .correlation_id
            .clone()
            .map(CorrelationId::from)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| request.correlation_id.clone());
        if correlation_id.is_empty() {
            return Err(InventoryError::Malformed(
                "missing correlation id".to_string(),
            ));
        }

        let reply_queue = if request.reply_queue_id.is_empty() {
            delivery
                .properties
                .reply_to
                .clone()
                .filter(|queue| !queue.is_empty())
                .ok_or_else(|| InventoryError::Malformed("missing reply queue".to_string()))?
        } else {
            request.reply_queue_id.clone()
        };

        let reply = if self.reserve(&correlation_id, &request).await {
            StockCheckReply::available()
        } else {
            StockCheckReply::unavailable()
        };

        self.broker
            .publish(
                &reply_queue,
                reply.encode()?,
                MessageProperties::new().with_correlation_id(correlation_id.as_str()),
            )
            .await?;

        tracing::debug!(
            %correlation_id,
            reply_queue,
            stock_available = reply.stock_available,
            redelivered = delivery.redelivered,
            "stock check answered"
        );
        Ok(())
    }

    /// Returns true only if the store confirmed the reservation.
    async fn reserve(&self, correlation_id: &CorrelationId, request: &StockCheckRequest) -> bool {
        if request.quantity == 0 {
            tracing::warn!(%correlation_id, product_id = %request.product_id, "zero quantity requested");
            return false;
        }

        let reservation =
            Reservation::new(correlation_id.clone(), request.product_id, request.quantity);

        match self.store.reserve(&reservation).await {
            Ok(outcome) => {
                metrics::counter!("stock_reservations_total", "outcome" => outcome.as_str())
                    .increment(1);
                tracing::info!(
                    %correlation_id,
                    product_id = %request.product_id,
                    quantity = request.quantity,
                    outcome = outcome.as_str(),
                    "stock check decided"
                );
                outcome.is_granted()
            }
            Err(e) => {
                metrics::counter!("stock_reservations_total", "outcome" => "error").increment(1);
                tracing::error!(
                    %correlation_id,
                    product_id = %request.product_id,
                    error = %e,
                    "reservation failed, answering unavailable"
                );
                false
            }
        }
    }
}
