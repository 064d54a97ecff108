use rdkafka::config::ClientConfig;
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the Kafka producer transport
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// How long librdkafka may try to deliver a message before failing the send
    pub message_timeout_ms: u64,
    /// How long a send waits for room in the local queue when it is full
    pub queue_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            message_timeout_ms: 5000,
            queue_timeout_ms: 5000,
        }
    }
}

impl ProducerConfig {
    pub(crate) fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub(crate) fn client_config(&self) -> Result<ClientConfig> {
        if self.brokers.trim().is_empty() {
            return Err(Error::InvalidConfig("brokers must not be empty".to_string()));
        }

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.message_timeout_ms.to_string());
        Ok(config)
    }
}

/// Configuration for the Kafka consumer transport
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    ///
    /// Consumers sharing a group ID split the topic's partitions between them.
    pub group_id: String,
    /// Topic to consume from
    ///
    /// Every message on the topic must be framed with the key and value
    /// schemas of the factory the consumer is built with.
    pub topic: String,
    /// Auto offset reset strategy ("earliest" or "latest")
    ///
    /// Only applies when the group has no committed position for a partition.
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Enable auto commit (should be false for manual offset management)
    ///
    /// Positions are committed by the consumer after each successful decode,
    /// so this is false by default.
    pub enable_auto_commit: bool,
    /// Capacity of the channel between the receive task and `consume`
    pub channel_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "schemabus-consumer".to_string(),
            topic: "".to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: "6000".to_string(),
            enable_auto_commit: false,
            channel_capacity: 100,
        }
    }
}

impl ConsumerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(Error::InvalidConfig("brokers must not be empty".to_string()));
        }
        if self.group_id.is_empty() {
            return Err(Error::InvalidConfig("group_id must not be empty".to_string()));
        }
        if self.topic.is_empty() {
            return Err(Error::InvalidConfig("topic must not be empty".to_string()));
        }
        if !matches!(self.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(Error::InvalidConfig(format!(
                "auto_offset_reset must be 'earliest' or 'latest', got '{}'",
                self.auto_offset_reset
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn client_config(&self) -> Result<ClientConfig> {
        self.validate()?;

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", self.enable_auto_commit.to_string())
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set("enable.partition.eof", "false");
        Ok(config)
    }
}
