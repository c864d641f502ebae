//! Order placement coordinator.

use std::time::Duration;

use broker::{Broker, MessageProperties, Subscription};
use common::{CorrelationId, DEFAULT_STOCK_QUEUE, ProductId, StockCheckReply, StockCheckRequest};
use tokio::time::{Instant, timeout_at};

use crate::order::{NewOrder, Order, PlaceOrder};
use crate::pending::{PendingRequest, PendingRequests};
use crate::store::OrderStore;
use crate::{OrderError, Result};

/// Default deadline for a stock check round trip.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default bound on concurrent stock checks.
pub const DEFAULT_MAX_PENDING: usize = 256;

/// Settings for an [`OrderCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Queue stock checks are published to.
    pub stock_queue: String,
    /// Deadline for the whole exchange, slot wait included.
    pub reply_timeout: Duration,
    /// Maximum number of stock checks in flight.
    pub max_pending: usize,
}

impl CoordinatorConfig {
    pub fn with_stock_queue(mut self, stock_queue: impl Into<String>) -> Self {
        self.stock_queue = stock_queue.into();
        self
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stock_queue: DEFAULT_STOCK_QUEUE.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Places orders after the inventory service confirmed the stock.
///
/// Each placement is one request/reply exchange over the broker: a private
/// exclusive reply queue is declared, a stock check carrying a fresh
/// correlation ID is published, and the call waits for the one reply bearing
/// that ID. Only a positive reply creates the order. The reply queue and the
/// pending entry are released on every exit path.
pub struct OrderCoordinator<B, S> {
    broker: B,
    store: S,
    config: CoordinatorConfig,
    pending: PendingRequests,
}

impl<B, S> OrderCoordinator<B, S>
where
    B: Broker + Clone,
    S: OrderStore,
{
    /// Creates a coordinator.
    pub fn new(broker: B, store: S, config: CoordinatorConfig) -> Self {
        let pending = PendingRequests::new(config.max_pending);
        Self {
            broker,
            store,
            config,
            pending,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns the table of in-flight stock checks.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Declares the durable stock queue so checks published before the
    /// inventory service starts are kept.
    pub async fn declare_stock_queue(&self) -> Result<()> {
        self.broker.declare_queue(&self.config.stock_queue).await?;
        Ok(())
    }

    /// Stops accepting new placements. Calls already waiting for a reply
    /// finish normally.
    pub fn close(&self) {
        self.pending.close();
    }

    /// Validates the request, confirms stock with the inventory service and
    /// stores a pending order.
    ///
    /// Returns [`OrderError::InsufficientStock`] without storing anything if
    /// the inventory service declines, and [`OrderError::Timeout`] if no
    /// reply arrives within the configured deadline.
    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        let (product_id, quantity) = request.validate()?;

        let correlation_id = CorrelationId::generate();
        let started = Instant::now();
        let available = self
            .check_stock(&correlation_id, product_id, quantity)
            .await;
        metrics::histogram!("stock_check_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match available {
            Ok(true) => {}
            Ok(false) => {
                metrics::counter!("orders_rejected_total").increment(1);
                tracing::info!(%correlation_id, %product_id, quantity, "stock check declined");
                return Err(OrderError::InsufficientStock {
                    product_id,
                    quantity,
                });
            }
            Err(e) => {
                if matches!(e, OrderError::Timeout { .. }) {
                    metrics::counter!("stock_check_timeouts_total").increment(1);
                }
                tracing::warn!(%correlation_id, error = %e, "stock check failed");
                return Err(e);
            }
        }

        let order = self
            .store
            .create(NewOrder::pending(product_id, quantity))
            .await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.id, %correlation_id, "order placed");
        Ok(order)
    }

    /// Runs one stock check under the configured deadline.
    async fn check_stock(
        &self,
        correlation_id: &CorrelationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        let deadline = Instant::now() + self.config.reply_timeout;
        let timed_out = || OrderError::Timeout {
            correlation_id: correlation_id.clone(),
            waited: self.config.reply_timeout,
        };

        let slot = timeout_at(deadline, self.pending.acquire())
            .await
            .map_err(|_| timed_out())??;
        let reply_queue = timeout_at(deadline, ReplyQueue::declare(&self.broker))
            .await
            .map_err(|_| timed_out())??;
        let _pending =
            slot.register(PendingRequest::new(correlation_id.clone(), reply_queue.name()));

        let result = timeout_at(
            deadline,
            self.exchange(
                reply_queue.name(),
                correlation_id,
                product_id,
                quantity,
                deadline,
            ),
        )
        .await
        .unwrap_or_else(|_| Err(timed_out()));

        reply_queue.release().await;
        result
    }

    /// Publishes the stock check and waits for its reply.
    ///
    /// The request expires in the stock queue when the deadline passes, so a
    /// check nobody waits for any more never reserves stock.
    async fn exchange(
        &self,
        reply_queue: &str,
        correlation_id: &CorrelationId,
        product_id: ProductId,
        quantity: u32,
        deadline: Instant,
    ) -> Result<bool> {
        // Consume before publishing so the reply cannot arrive unobserved.
        let mut replies = self.broker.consume(reply_queue).await?;

        let request =
            StockCheckRequest::new(product_id, quantity, reply_queue, correlation_id.clone());
        self.broker
            .publish(
                &self.config.stock_queue,
                request.encode()?,
                MessageProperties::new()
                    .with_correlation_id(correlation_id.as_str())
                    .with_reply_to(reply_queue)
                    .with_expiration(deadline.saturating_duration_since(Instant::now())),
            )
            .await?;
        tracing::debug!(%correlation_id, reply_queue, "stock check published");

        loop {
            let Some(delivery) = replies.next().await? else {
                return Err(OrderError::ReplyChannelClosed(correlation_id.clone()));
            };

            if !delivery.properties.correlates_with(correlation_id.as_str()) {
                tracing::warn!(
                    expected = %correlation_id,
                    received = ?delivery.properties.correlation_id,
                    "discarding reply for another stock check"
                );
                delivery.reject().await?;
                continue;
            }

            return match StockCheckReply::decode(&delivery.payload) {
                Ok(reply) => {
                    delivery.ack().await?;
                    Ok(reply.stock_available)
                }
                Err(e) => {
                    delivery.reject().await?;
                    Err(e.into())
                }
            };
        }
    }
}

/// Exclusive reply queue owned by one stock check.
///
/// Deleted by [`ReplyQueue::release`]; if the owning call is cancelled first,
/// deletion is spawned onto the runtime from `Drop`.
struct ReplyQueue<B: Broker + Clone> {
    broker: B,
    name: String,
    released: bool,
}

impl<B: Broker + Clone> ReplyQueue<B> {
    async fn declare(broker: &B) -> Result<Self> {
        let name = broker.declare_exclusive_queue().await?;
        Ok(Self {
            broker: broker.clone(),
            name,
            released: false,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.broker.delete_queue(&self.name).await {
            tracing::warn!(queue = %self.name, error = %e, "failed to delete reply queue");
        }
    }
}

impl<B: Broker + Clone> Drop for ReplyQueue<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(queue = %self.name, "no runtime to delete reply queue");
            return;
        };

        let broker = self.broker.clone();
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            if let Err(e) = broker.delete_queue(&name).await {
                tracing::warn!(queue = %name, error = %e, "failed to delete reply queue");
            }
        });
    }
}
