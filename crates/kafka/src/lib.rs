//! Schema-governed Kafka producer and consumer.
//!
//! Every key and value on the wire is prefixed with a magic byte and the
//! registry id of the schema it was encoded with. A [`MessageFactory`]
//! binds a topic to one key subject and one value subject, resolves both
//! once, and from then on encodes and decodes without touching the registry.
//!
//! Features:
//!
//! - Envelope framing compatible with Confluent's wire format
//! - Schema mismatch detection on decode
//! - Consumer groups with a commit after every decoded message
//! - An in-memory broker for tests and local runs
//!
//! ```rust,no_run
//! use schemabus_kafka::{Consumer, ConsumerConfig, KeyValue, MessageFactory, Producer, ProducerConfig};
//! use schemabus_registry::HttpSchemaRegistry;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = Arc::new(HttpSchemaRegistry::from_url("http://localhost:8081")?);
//! let factory = MessageFactory::new("orders", "orders-key", "orders-value", registry).await?;
//!
//! let producer = Producer::connect(&ProducerConfig::default())?;
//! producer.send(&factory.encode("order-1", &42i64)?).await?;
//!
//! let consumer = Consumer::connect(factory, &ConsumerConfig::default())?;
//! let mut record = KeyValue::<String, i64>::default();
//! consumer.consume(&CancellationToken::new(), &mut record).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;

/// Consumer that decodes into [`Record`]s and commits per message
pub mod consumer;
pub mod error;
pub mod factory;
pub mod message;
pub mod producer;
pub mod record;

/// Producer and consumer transports: Kafka and in-memory
pub mod transport;
pub mod wire;

pub use config::{ConsumerConfig, ProducerConfig};
pub use consumer::Consumer;
pub use error::{CloseReason, Error, Field, Result, TransportError};
pub use factory::MessageFactory;
pub use message::Message;
pub use producer::Producer;
pub use record::{KeyValue, Record};
pub use transport::memory::MemoryBroker;
pub use transport::{
    ConsumedRecord, ConsumerChannels, ConsumerTransport, Delivery, Notification, ProducerTransport,
    TopicPartition,
};
