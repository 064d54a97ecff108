//! Kafka E2E tests
//!
//! These need a Kafka broker and a schema registry. They are ignored by
//! default; run them with:
//!
//!   KAFKA_BROKERS=localhost:9092 SCHEMA_REGISTRY_URL=http://localhost:8081 \
//!     cargo test --test kafka -- --ignored

mod consumer_group;
mod round_trip;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use schemabus::registry::{HttpSchemaRegistry, SchemaRegistry};

pub fn brokers() -> String {
    std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "kafka:9092".to_string())
}

pub fn registry() -> Arc<dyn SchemaRegistry> {
    let url = std::env::var("SCHEMA_REGISTRY_URL")
        .unwrap_or_else(|_| "http://schema-registry:8081".to_string());
    Arc::new(HttpSchemaRegistry::from_url(&url).unwrap())
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("schemabus=debug,schemabus_kafka=debug,schemabus_registry=debug")
        .try_init()
        .ok();
}

/// Unique suffix so repeated runs never share topics, groups or subjects.
pub fn test_id() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

pub async fn create_topic(topic: &str, partitions: i32) {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers())
        .create()
        .unwrap();

    let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
    let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));
    for result in admin.create_topics(&[new_topic], &opts).await.unwrap() {
        if let Err((name, err)) = result {
            if !err.to_string().contains("already exists") {
                panic!("Failed to create topic {name}: {err}");
            }
        }
    }

    // Give Kafka a moment to propagate topic metadata
    tokio::time::sleep(Duration::from_millis(500)).await;
}
