//! Seam between the producer/consumer and the message broker.
//!
//! [`kafka`] talks to a real cluster through rdkafka. [`memory`] keeps
//! topics and consumer groups in process.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub mod kafka;
pub mod memory;

/// A record as delivered by a transport, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Milliseconds since epoch
    pub timestamp: Option<i64>,
}

/// Where the broker stored a produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// Consumer group membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Assigned(Vec<TopicPartition>),
    Revoked(Vec<TopicPartition>),
    Failed(String),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |partitions: &[TopicPartition]| {
            partitions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::Assigned(partitions) => write!(f, "assigned [{}]", join(partitions)),
            Self::Revoked(partitions) => write!(f, "revoked [{}]", join(partitions)),
            Self::Failed(reason) => write!(f, "rebalance failed: {reason}"),
        }
    }
}

/// Receiving ends a consumer transport feeds.
///
/// `messages` closing means the transport has stopped for good. `errors`
/// and `notifications` are informational.
#[derive(Debug)]
pub struct ConsumerChannels {
    pub messages: mpsc::Receiver<ConsumedRecord>,
    pub errors: mpsc::Receiver<TransportError>,
    pub notifications: mpsc::Receiver<Notification>,
}

#[async_trait]
pub trait ProducerTransport: Send + Sync {
    /// Publish one message and wait for the broker's acknowledgement.
    async fn send_message(
        &self,
        topic: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<Delivery, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    /// Record `record` as processed for the consumer group.
    async fn mark_offset(&self, record: &ConsumedRecord) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
