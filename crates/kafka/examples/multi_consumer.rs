use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use schemabus_kafka::{Consumer, KeyValue, MemoryBroker, MessageFactory, Producer};
use schemabus_registry::{MemorySchemaRegistry, SchemaResolver};
use tokio_util::sync::CancellationToken;

/// Example demonstrating multiple consumers in a consumer group
///
/// This example shows how to:
/// 1. Register key and value schemas
/// 2. Build a message factory bound to both subjects
/// 3. Produce schema-framed messages
/// 4. Spawn multiple consumers in the same consumer group
/// 5. Decode each message into a typed record
///
/// It runs entirely in process against the in-memory broker and registry:
///   cargo run -p schemabus-kafka --example multi_consumer

const USER_EVENT_SCHEMA: &str = r#"{
    "type": "record",
    "name": "UserEvent",
    "namespace": "example",
    "fields": [
        {"name": "user_id", "type": "string"},
        {"name": "event_type", "type": "string"},
        {"name": "timestamp", "type": "long"},
        {"name": "data", "type": "string"}
    ]
}"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserEvent {
    user_id: String,
    event_type: String,
    timestamp: i64,
    data: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    match run_main().await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let registry = Arc::new(MemorySchemaRegistry::new());
    SchemaResolver::new(registry.clone())
        .register(
            "user-events-key",
            r#""string""#,
            "user-events-value",
            USER_EVENT_SCHEMA,
        )
        .await?;

    let factory =
        MessageFactory::new("user-events", "user-events-key", "user-events-value", registry).await?;

    let broker = MemoryBroker::new();
    broker.create_topic("user-events", 6).await;

    // Spawn 3 consumers in the same consumer group
    // Each consumer will process different partitions
    println!("Spawning 3 consumers in the same consumer group...");
    let processed_count = Arc::new(AtomicU64::new(0));
    let ctx = CancellationToken::new();
    let mut handles = Vec::new();
    for i in 0..3 {
        let (transport, channels) = broker.subscribe("user-events-group", "user-events", 10).await;
        let consumer = Consumer::new(factory.clone(), transport, channels);
        let counter = Arc::clone(&processed_count);
        let ctx = ctx.clone();

        handles.push(tokio::spawn(async move {
            let mut record = KeyValue::<String, UserEvent>::default();
            loop {
                match consumer.consume(&ctx, &mut record).await {
                    Ok(()) => {
                        let event = &record.value;
                        println!(
                            "[Consumer {i}] User: {}, Event: {}, Timestamp: {}, Data: {}",
                            record.key, event.event_type, event.timestamp, event.data
                        );
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) if e.is_consumer_closed() => break,
                    Err(e) => eprintln!("[Consumer {i}] {e}"),
                }
            }
            consumer.close().await
        }));
    }

    let producer = Producer::new(broker.producer());
    for n in 0..30i64 {
        let user_id = format!("user_{:03}", n % 7);
        let event = UserEvent {
            user_id: user_id.clone(),
            event_type: if n % 2 == 0 { "login" } else { "logout" }.to_string(),
            timestamp: 1_700_000_000 + n,
            data: format!("event #{n}"),
        };
        producer.send(&factory.encode(&user_id, &event)?).await?;
    }
    producer.close().await?;

    while processed_count.load(Ordering::SeqCst) < 30 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    ctx.cancel();

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(())) => println!("Consumer {i} finished successfully"),
            Ok(Err(e)) => eprintln!("Consumer {i} error: {e}"),
            Err(e) => eprintln!("Consumer {i} task error: {e}"),
        }
    }

    println!(
        "Processed {} messages total",
        processed_count.load(Ordering::SeqCst)
    );
    Ok(())
}
