//! Command-line interface for schemabus
//!
//! # Usage Examples
//!
//! ```bash
//! # Register schemas once (safe to repeat)
//! schemabus register \
//!   --key-subject orders-key --key-schema-file schemas/order_key.avsc \
//!   --value-subject orders-value --value-schema-file schemas/order.avsc \
//!   --registry-url http://localhost:8081
//!
//! # Produce a message
//! schemabus produce --topic orders \
//!   --key-subject orders-key --value-subject orders-value \
//!   --key '"order-1"' --value '{"sku": "apple", "quantity": 3}' \
//!   --brokers localhost:9092
//!
//! # Consume until Ctrl+C
//! RUST_LOG=schemabus=info schemabus consume --topic orders --group-id billing \
//!   --key-subject orders-key --value-subject orders-value
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use schemabus::commands::{self, ConsumeArgs, ProduceArgs, RegisterArgs};
use schemabus::RegistryOpts;
use schemabus_kafka::{Consumer, MessageFactory, Producer, ProducerConfig};
use schemabus_registry::{HttpRegistryConfig, HttpSchemaRegistry, SchemaRegistry};

#[derive(Parser)]
#[command(name = "schemabus")]
#[command(about = "Produce and consume schema-registry framed Kafka messages")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register key and value schemas under their subjects
    Register(RegisterArgs),

    /// Encode a JSON key and value and publish them
    Produce(ProduceArgs),

    /// Consume messages and print them as JSON lines
    Consume(ConsumeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register(args) => {
            let registry = connect_registry(&args.registry)?;
            commands::register(
                registry,
                &args.subjects,
                &args.key_schema_file,
                &args.value_schema_file,
            )
            .await?;
        }
        Commands::Produce(args) => {
            let registry = connect_registry(&args.registry)?;
            let factory = MessageFactory::new(
                &args.topic,
                &args.subjects.key_subject,
                &args.subjects.value_subject,
                registry,
            )
            .await
            .context("Failed to resolve schemas")?;

            let producer = Producer::connect(&ProducerConfig::from(&args.kafka))
                .context("Failed to create Kafka producer")?;
            let result = commands::produce(&factory, &producer, &args.key, &args.value).await;
            producer.close().await.context("Failed to flush producer")?;

            let delivery = result?;
            println!(
                "Delivered to {}[{}] at offset {}",
                args.topic, delivery.partition, delivery.offset
            );
        }
        Commands::Consume(args) => {
            let registry = connect_registry(&args.registry)?;
            let factory = MessageFactory::new(
                &args.topic,
                &args.subjects.key_subject,
                &args.subjects.value_subject,
                registry,
            )
            .await
            .context("Failed to resolve schemas")?;

            let config = args.kafka.consumer_config(&args.group_id, &args.topic);
            let consumer =
                Consumer::connect(factory, &config).context("Failed to create Kafka consumer")?;

            let ctx = CancellationToken::new();
            let interrupt = ctx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, stopping consumer");
                    interrupt.cancel();
                }
            });

            let mut stdout = std::io::stdout();
            let result = commands::consume(&consumer, &ctx, args.max_messages, &mut stdout).await;
            consumer.close().await.context("Failed to close consumer")?;

            let count = result?;
            tracing::info!("Consumed {count} messages");
        }
    }

    Ok(())
}

fn connect_registry(opts: &RegistryOpts) -> anyhow::Result<Arc<dyn SchemaRegistry>> {
    let registry = HttpSchemaRegistry::new(HttpRegistryConfig::from(opts))
        .context("Failed to configure schema registry client")?;
    Ok(Arc::new(registry))
}
