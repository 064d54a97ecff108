//! Schemabus Library
//!
//! Produce and consume Kafka messages whose keys and values are Avro-encoded
//! and tagged with the schema registry id of their schema.
//!
//! # Crates
//!
//! - `schemabus_registry` - registry client, in-memory registry, Avro codec, schema resolver
//! - `schemabus_kafka` - envelope framing, message factory, producer, consumer
//!
//! # CLI Usage
//!
//! ```bash
//! # Register key and value schemas (no-op when already registered)
//! schemabus register --key-subject orders-key --key-schema-file key.avsc \
//!   --value-subject orders-value --value-schema-file value.avsc
//!
//! # Produce one message from JSON
//! schemabus produce --topic orders --key-subject orders-key --value-subject orders-value \
//!   --key '"order-1"' --value '{"amount": 42}'
//!
//! # Consume and print one JSON line per message
//! schemabus consume --topic orders --group-id billing \
//!   --key-subject orders-key --value-subject orders-value
//! ```

use clap::Parser;
use std::time::Duration;

pub mod commands;

pub use schemabus_kafka as kafka;
pub use schemabus_registry as registry;

#[derive(Parser, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated list)
    #[arg(long, default_value = "localhost:9092", env = "KAFKA_BROKERS")]
    pub brokers: String,

    /// Delivery timeout for produced messages in milliseconds
    #[arg(long, default_value = "5000")]
    pub message_timeout_ms: u64,

    /// How long a send waits for space in the producer queue, in milliseconds
    #[arg(long, default_value = "5000")]
    pub queue_timeout_ms: u64,
}

#[derive(Parser, Clone, Debug)]
pub struct RegistryOpts {
    /// Schema registry base URL
    #[arg(
        long,
        default_value = "http://localhost:8081",
        env = "SCHEMA_REGISTRY_URL"
    )]
    pub registry_url: String,

    /// Schema registry basic auth username
    #[arg(long, env = "SCHEMA_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    /// Schema registry basic auth password
    #[arg(long, env = "SCHEMA_REGISTRY_PASSWORD")]
    pub registry_password: Option<String>,

    /// Schema registry request timeout in seconds
    #[arg(long, default_value = "10")]
    pub registry_timeout_secs: u64,
}

#[derive(Parser, Clone, Debug)]
pub struct SubjectOpts {
    /// Registry subject holding the key schema
    #[arg(long)]
    pub key_subject: String,

    /// Registry subject holding the value schema
    #[arg(long)]
    pub value_subject: String,
}

impl From<&KafkaOpts> for schemabus_kafka::ProducerConfig {
    fn from(opts: &KafkaOpts) -> Self {
        Self {
            brokers: opts.brokers.clone(),
            message_timeout_ms: opts.message_timeout_ms,
            queue_timeout_ms: opts.queue_timeout_ms,
        }
    }
}

impl From<&RegistryOpts> for schemabus_registry::HttpRegistryConfig {
    fn from(opts: &RegistryOpts) -> Self {
        Self {
            url: opts.registry_url.clone(),
            timeout: Duration::from_secs(opts.registry_timeout_secs),
            username: opts.registry_username.clone(),
            password: opts.registry_password.clone(),
        }
    }
}

impl KafkaOpts {
    /// Consumer configuration for `group_id` on `topic`, other settings at their defaults.
    pub fn consumer_config(&self, group_id: &str, topic: &str) -> schemabus_kafka::ConsumerConfig {
        schemabus_kafka::ConsumerConfig {
            brokers: self.brokers.clone(),
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            ..Default::default()
        }
    }
}
