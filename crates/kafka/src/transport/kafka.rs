//! rdkafka-backed transports.

use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer as RdkafkaConsumer, ConsumerContext, Rebalance,
    StreamConsumer as RdkafkaStreamConsumer,
};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as RdkafkaProducer};
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConsumedRecord, ConsumerChannels, ConsumerTransport, Delivery, Notification, ProducerTransport,
    TopicPartition,
};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::error::{Result, TransportError};

const SIDE_CHANNEL_CAPACITY: usize = 64;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer transport over an rdkafka `FutureProducer`.
pub struct KafkaProducerTransport {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaProducerTransport {
    pub fn new(config: &ProducerConfig) -> Result<Self> {
        let producer: FutureProducer = config.client_config()?.create()?;
        info!("Kafka producer created for brokers {}", config.brokers);
        Ok(Self {
            producer,
            queue_timeout: config.queue_timeout(),
        })
    }
}

#[async_trait]
impl ProducerTransport for KafkaProducerTransport {
    async fn send_message(
        &self,
        topic: &str,
        key: &[u8],
        value: &[u8],
    ) -> std::result::Result<Delivery, TransportError> {
        let record = FutureRecord::to(topic).key(key).payload(value);
        let delivery = self
            .producer
            .send(record, self.queue_timeout)
            .await
            .map_err(|(err, _)| Box::new(err) as TransportError)?;

        Ok(Delivery {
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        self.producer.flush(FLUSH_TIMEOUT)?;
        debug!("Kafka producer flushed");
        Ok(())
    }
}

/// Forwards rebalances and client errors onto the consumer's side channels.
struct BusContext {
    errors: mpsc::Sender<TransportError>,
    notifications: mpsc::Sender<Notification>,
}

impl BusContext {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifications.try_send(notification) {
            warn!("Dropping rebalance notification: {e}");
        }
    }
}

impl ClientContext for BusContext {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!("Kafka client error: {error} ({reason})");
        if let Err(e) = self.errors.try_send(Box::new(error)) {
            warn!("Dropping Kafka client error: {e}");
        }
    }
}

impl ConsumerContext for BusContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(tpl) = rebalance {
            self.notify(Notification::Revoked(partitions(tpl)));
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => self.notify(Notification::Assigned(partitions(tpl))),
            Rebalance::Revoke(_) => {}
            Rebalance::Error(err) => self.notify(Notification::Failed(err.to_string())),
        }
    }
}

fn partitions(tpl: &TopicPartitionList) -> Vec<TopicPartition> {
    tpl.elements()
        .iter()
        .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
        .collect()
}

fn to_record(msg: &BorrowedMessage<'_>) -> ConsumedRecord {
    ConsumedRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        value: msg.payload().map(<[u8]>::to_vec),
        timestamp: msg.timestamp().to_millis(),
    }
}

type BusStreamConsumer = RdkafkaStreamConsumer<BusContext>;

/// Consumer transport over an rdkafka `StreamConsumer` with manual commits.
pub struct KafkaConsumerTransport {
    consumer: Arc<BusStreamConsumer>,
    shutdown: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaConsumerTransport {
    /// Create the consumer, subscribe to the configured topic and start
    /// forwarding records onto the returned channels.
    pub fn connect(config: &ConsumerConfig) -> Result<(Self, ConsumerChannels)> {
        let (message_tx, messages) = mpsc::channel(config.channel_capacity);
        let (error_tx, errors) = mpsc::channel(SIDE_CHANNEL_CAPACITY);
        let (notification_tx, notifications) = mpsc::channel(SIDE_CHANNEL_CAPACITY);

        let context = BusContext {
            errors: error_tx.clone(),
            notifications: notification_tx,
        };
        let consumer: BusStreamConsumer = config.client_config()?.create_with_context(context)?;
        consumer.subscribe(&[&config.topic])?;
        info!(
            "Kafka consumer in group '{}' subscribed to topic '{}'",
            config.group_id, config.topic
        );

        let consumer = Arc::new(consumer);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(pump(
            consumer.clone(),
            shutdown.clone(),
            message_tx,
            error_tx,
        ));

        let transport = Self {
            consumer,
            shutdown,
            pump: Mutex::new(Some(pump)),
        };
        let channels = ConsumerChannels {
            messages,
            errors,
            notifications,
        };
        Ok((transport, channels))
    }
}

async fn pump(
    consumer: Arc<BusStreamConsumer>,
    shutdown: CancellationToken,
    messages: mpsc::Sender<ConsumedRecord>,
    errors: mpsc::Sender<TransportError>,
) {
    loop {
        let record = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = consumer.recv() => match received {
                Ok(msg) => to_record(&msg),
                Err(e) => {
                    if errors.try_send(Box::new(e)).is_err() {
                        warn!("Dropping Kafka receive error");
                    }
                    continue;
                }
            },
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = messages.send(record) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Kafka receive task stopped");
}

#[async_trait]
impl ConsumerTransport for KafkaConsumerTransport {
    async fn mark_offset(&self, record: &ConsumedRecord) -> std::result::Result<(), TransportError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )?;
        self.consumer.commit(&tpl, CommitMode::Sync)?;
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        self.shutdown.cancel();
        if let Some(handle) = self.pump.lock().await.take() {
            handle.await?;
            self.consumer.unsubscribe();
            info!("Kafka consumer unsubscribed");
        }
        Ok(())
    }
}
