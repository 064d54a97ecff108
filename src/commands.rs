//! Implementations of the `register`, `produce` and `consume` subcommands.
//!
//! Each command takes already-connected components so it can run against
//! the in-memory registry and broker as well as real services.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use schemabus_kafka::{Consumer, Delivery, KeyValue, MessageFactory, Producer};
use schemabus_registry::{SchemaRegistry, SchemaResolver};

use crate::{KafkaOpts, RegistryOpts, SubjectOpts};

#[derive(Args, Clone, Debug)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub subjects: SubjectOpts,

    /// File containing the key schema definition
    #[arg(long)]
    pub key_schema_file: PathBuf,

    /// File containing the value schema definition
    #[arg(long)]
    pub value_schema_file: PathBuf,

    #[command(flatten)]
    pub registry: RegistryOpts,
}

#[derive(Args, Clone, Debug)]
pub struct ProduceArgs {
    /// Topic to publish to
    #[arg(long)]
    pub topic: String,

    #[command(flatten)]
    pub subjects: SubjectOpts,

    /// Message key as JSON
    #[arg(long)]
    pub key: String,

    /// Message value as JSON
    #[arg(long)]
    pub value: String,

    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub registry: RegistryOpts,
}

#[derive(Args, Clone, Debug)]
pub struct ConsumeArgs {
    /// Topic to consume from
    #[arg(long)]
    pub topic: String,

    /// Consumer group ID
    #[arg(long, default_value = "schemabus-consumer")]
    pub group_id: String,

    #[command(flatten)]
    pub subjects: SubjectOpts,

    /// Stop after this many messages (default: run until interrupted)
    #[arg(long)]
    pub max_messages: Option<usize>,

    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub registry: RegistryOpts,
}

/// Register the key and value schemas read from files.
pub async fn register(
    registry: Arc<dyn SchemaRegistry>,
    subjects: &SubjectOpts,
    key_schema_file: &Path,
    value_schema_file: &Path,
) -> Result<()> {
    let key_schema = read_schema(key_schema_file).await?;
    let value_schema = read_schema(value_schema_file).await?;

    SchemaResolver::new(registry)
        .register(
            &subjects.key_subject,
            &key_schema,
            &subjects.value_subject,
            &value_schema,
        )
        .await
        .context("Failed to register schemas")?;

    info!(
        "Schemas registered for subjects '{}' and '{}'",
        subjects.key_subject, subjects.value_subject
    );
    Ok(())
}

async fn read_schema(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read schema from {path:?}"))
}

/// Encode a JSON key and value and publish them.
pub async fn produce(
    factory: &MessageFactory,
    producer: &Producer,
    key: &str,
    value: &str,
) -> Result<Delivery> {
    let key: Value = serde_json::from_str(key).context("Key is not valid JSON")?;
    let value: Value = serde_json::from_str(value).context("Value is not valid JSON")?;

    let message = factory
        .encode(&key, &value)
        .context("Failed to encode message")?;
    let delivery = producer
        .send(&message)
        .await
        .context("Failed to send message")?;
    Ok(delivery)
}

/// Consume messages and write one JSON line per message to `out`.
///
/// Stops after `max_messages`, or when the consumer is closed or `ctx` is
/// cancelled. Returns the number of messages written.
pub async fn consume<W: Write>(
    consumer: &Consumer,
    ctx: &CancellationToken,
    max_messages: Option<usize>,
    out: &mut W,
) -> Result<usize> {
    let mut count = 0;
    let mut record = KeyValue::<Value, Value>::default();

    while max_messages.is_none_or(|max| count < max) {
        match consumer.consume(ctx, &mut record).await {
            Ok(()) => {
                let line = json!({ "key": record.key, "value": record.value });
                writeln!(out, "{line}").context("Failed to write message")?;
                count += 1;
            }
            Err(e) if e.is_consumer_closed() => {
                info!("Consumer stopped: {e}");
                break;
            }
            Err(e) => return Err(e).context("Failed to consume message"),
        }
    }

    Ok(count)
}
