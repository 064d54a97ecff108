use tracing::debug;

use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::transport::kafka::KafkaProducerTransport;
use crate::transport::{Delivery, ProducerTransport};

/// Publishes framed messages through a transport.
pub struct Producer {
    transport: Box<dyn ProducerTransport>,
}

impl Producer {
    pub fn new(transport: impl ProducerTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    /// Create a producer backed by a Kafka cluster.
    pub fn connect(config: &ProducerConfig) -> Result<Self> {
        Ok(Self::new(KafkaProducerTransport::new(config)?))
    }

    /// Publish `message` on its topic and wait for the acknowledgement.
    pub async fn send(&self, message: &Message) -> Result<Delivery> {
        let delivery = self
            .transport
            .send_message(message.topic(), message.key(), message.value())
            .await
            .map_err(|e| Error::transport("send", e))?;

        debug!(
            "Sent message to {}[{}] at offset {}",
            message.topic(),
            delivery.partition,
            delivery.offset
        );
        Ok(delivery)
    }

    pub async fn close(&self) -> Result<()> {
        self.transport
            .close()
            .await
            .map_err(|e| Error::transport("close", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBroker;
    use crate::wire;

    #[tokio::test]
    async fn test_send_passes_bytes_through() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1).await;
        let producer = Producer::new(broker.producer());

        let message = Message::new("t", wire::frame(b"k", 1), wire::frame(b"v", 2));
        let delivery = tokio_test::assert_ok!(producer.send(&message).await);
        assert_eq!(delivery, Delivery { partition: 0, offset: 0 });

        let (_transport, mut channels) = broker.subscribe("g", "t", 4).await;
        let record = channels.messages.recv().await.unwrap();
        assert_eq!(Message::from(&record), message);
    }

    #[tokio::test]
    async fn test_send_after_close_is_transport_error() {
        let broker = MemoryBroker::new();
        let producer = Producer::new(broker.producer());
        tokio_test::assert_ok!(producer.close().await);

        let err = producer
            .send(&Message::new("t", vec![0u8; 5], vec![0u8; 5]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { operation: "send", .. }));
    }
}
