use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::error::{CloseReason, Error, Result};
use crate::factory::MessageFactory;
use crate::message::Message;
use crate::record::Record;
use crate::transport::kafka::KafkaConsumerTransport;
use crate::transport::{ConsumerChannels, ConsumerTransport};

/// Consumer that decodes every message with a fixed [`MessageFactory`] and
/// commits its position after each successful decode.
///
/// `consume` and `close` take `&self`, so a consumer can be shared with
/// `Arc` and closed from another task while a `consume` call is blocked.
pub struct Consumer {
    factory: MessageFactory,
    transport: Box<dyn ConsumerTransport>,
    channels: Mutex<ConsumerChannels>,
    closed: CancellationToken,
}

impl Consumer {
    pub fn new(
        factory: MessageFactory,
        transport: impl ConsumerTransport + 'static,
        channels: ConsumerChannels,
    ) -> Self {
        Self {
            factory,
            transport: Box::new(transport),
            channels: Mutex::new(channels),
            closed: CancellationToken::new(),
        }
    }

    /// Join the configured consumer group on a Kafka cluster.
    ///
    /// An empty `config.topic` means the factory's topic.
    pub fn connect(factory: MessageFactory, config: &ConsumerConfig) -> Result<Self> {
        let mut config = config.clone();
        if config.topic.is_empty() {
            config.topic = factory.topic().to_string();
        } else if config.topic != factory.topic() {
            return Err(Error::InvalidConfig(format!(
                "consumer topic '{}' does not match factory topic '{}'",
                config.topic,
                factory.topic()
            )));
        }

        let (transport, channels) = KafkaConsumerTransport::connect(&config)?;
        Ok(Self::new(factory, transport, channels))
    }

    pub fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    /// Wait for the next message, decode it into `record` and commit it.
    ///
    /// Transport errors and rebalance notifications that arrive meanwhile
    /// are logged, not returned. Returns [`Error::ConsumerClosed`] once
    /// `ctx` is cancelled, the consumer is closed or the transport stops.
    /// A message that fails to decode is not committed.
    pub async fn consume<R: Record>(&self, ctx: &CancellationToken, record: &mut R) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::ConsumerClosed(CloseReason::Cancelled));
        }

        let mut guard = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Error::ConsumerClosed(CloseReason::Cancelled)),
            _ = self.closed.cancelled() => return Err(Error::ConsumerClosed(CloseReason::Closed)),
            guard = self.channels.lock() => guard,
        };
        let channels = &mut *guard;

        // Drain side channels without blocking.
        loop {
            if ctx.is_cancelled() {
                return Err(Error::ConsumerClosed(CloseReason::Cancelled));
            }
            let mut drained = false;
            if let Ok(err) = channels.errors.try_recv() {
                warn!("Transport error: {err}");
                drained = true;
            }
            if let Ok(notification) = channels.notifications.try_recv() {
                info!("Consumer group {notification}");
                drained = true;
            }
            if !drained {
                break;
            }
        }

        let consumed = loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::ConsumerClosed(CloseReason::Cancelled)),
                _ = self.closed.cancelled() => return Err(Error::ConsumerClosed(CloseReason::Closed)),
                received = channels.messages.recv() => match received {
                    Some(consumed) => break consumed,
                    None => return Err(Error::ConsumerClosed(CloseReason::ChannelClosed)),
                },
                Some(err) = channels.errors.recv() => warn!("Transport error: {err}"),
                Some(notification) = channels.notifications.recv() => {
                    info!("Consumer group {notification}")
                }
            }
        };

        let message = Message::from(&consumed);
        let (key, value) = self
            .factory
            .decode::<R::Key, R::Value>(&message)
            .inspect_err(|e| {
                warn!(
                    "Failed to decode message at {}[{}] offset {}: {e}",
                    consumed.topic, consumed.partition, consumed.offset
                )
            })?;
        *record.key_mut() = key;
        *record.value_mut() = value;

        self.transport
            .mark_offset(&consumed)
            .await
            .map_err(|e| Error::transport("mark_offset", e))?;

        debug!(
            "Consumed and committed {}[{}] offset {}",
            consumed.topic, consumed.partition, consumed.offset
        );
        Ok(())
    }

    /// Stop delivering messages and release the transport.
    ///
    /// Pending and later `consume` calls return [`Error::ConsumerClosed`].
    pub async fn close(&self) -> Result<()> {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            info!("Closing consumer for topic '{}'", self.factory.topic());
        }
        self.transport
            .close()
            .await
            .map_err(|e| Error::transport("close", e))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
