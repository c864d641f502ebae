//! AMQP 0-9-1 broker backed by `lapin`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::broker::{Broker, Subscription};
use crate::delivery::{Acknowledger, Delivery, MessageProperties};
use crate::error::{BrokerError, Result};

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// Connection settings for [`AmqpBroker`].
#[derive(Debug, Clone)]
pub struct AmqpOptions {
    /// Connection name shown in the RabbitMQ management UI.
    pub connection_name: String,
    /// Maximum unacked deliveries per consumer.
    pub prefetch: u16,
}

impl Default for AmqpOptions {
    fn default() -> Self {
        Self {
            connection_name: "stock-check".to_string(),
            prefetch: 16,
        }
    }
}

/// Broker client speaking AMQP to RabbitMQ.
///
/// Holds one connection and one channel; clones share both. Exclusive queues
/// declared through it belong to this connection and vanish with it.
#[derive(Clone)]
pub struct AmqpBroker {
    connection: Arc<Connection>,
    channel: Channel,
}

impl AmqpBroker {
    /// Connects to the broker at `uri` and opens a channel.
    ///
    /// Fails with [`BrokerError::Connection`] if the broker is unreachable.
    pub async fn connect(uri: &str, options: AmqpOptions) -> Result<Self> {
        let properties = ConnectionProperties::default()
            .with_connection_name(options.connection_name.clone().into())
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(uri, properties)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        channel
            .basic_qos(options.prefetch, BasicQosOptions::default())
            .await?;

        tracing::info!(
            connection_name = %options.connection_name,
            prefetch = options.prefetch,
            "connected to AMQP broker"
        );

        Ok(Self {
            connection: Arc::new(connection),
            channel,
        })
    }

    /// Closes the channel and the connection.
    pub async fn close(&self) -> Result<()> {
        self.channel.close(200, "shutdown").await?;
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

fn to_amqp_properties(properties: &MessageProperties) -> BasicProperties {
    let mut amqp = BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_content_type(ShortString::from("application/json"));
    if let Some(correlation_id) = &properties.correlation_id {
        amqp = amqp.with_correlation_id(ShortString::from(correlation_id.as_str()));
    }
    if let Some(reply_to) = &properties.reply_to {
        amqp = amqp.with_reply_to(ShortString::from(reply_to.as_str()));
    }
    if let Some(expiration) = properties.expiration {
        // Per-message TTL in milliseconds; "0" would mean deliver-now-or-drop.
        let millis = expiration.as_millis().max(1);
        amqp = amqp.with_expiration(ShortString::from(millis.to_string()));
    }
    amqp
}

fn from_amqp_properties(properties: &BasicProperties) -> MessageProperties {
    MessageProperties {
        correlation_id: properties
            .correlation_id()
            .as_ref()
            .map(|s| s.as_str().to_string()),
        reply_to: properties
            .reply_to()
            .as_ref()
            .map(|s| s.as_str().to_string()),
        expiration: properties
            .expiration()
            .as_ref()
            .and_then(|s| s.as_str().parse::<u64>().ok())
            .map(Duration::from_millis),
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&self, name: &str) -> Result<()> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_exclusive_queue(&self) -> Result<String> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(queue.name().as_str().to_string())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                to_amqp_properties(&properties),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Subscription>> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(Box::new(AmqpSubscription { consumer }))
    }

    async fn delete_queue(&self, name: &str) -> Result<()> {
        self.channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

struct AmqpSubscription {
    consumer: lapin::Consumer,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => {
                let properties = from_amqp_properties(&delivery.properties);
                Ok(Some(Delivery::new(
                    delivery.delivery_tag,
                    delivery.data,
                    properties,
                    delivery.redelivered,
                    Box::new(AmqpAcker {
                        acker: delivery.acker,
                    }),
                )))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<()> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}
