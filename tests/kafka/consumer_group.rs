use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use schemabus::kafka::{Consumer, ConsumerConfig, MessageFactory, Producer, ProducerConfig};
use schemabus::registry::SchemaResolver;

use crate::{brokers, create_topic, init_tracing, registry, test_id};

#[tokio::test]
#[ignore = "requires Kafka and a schema registry"]
async fn test_two_consumers_in_one_group_decode_each_message_once() {
    init_tracing();
    let id = test_id();
    let topic = format!("test-group-topic-{id}");
    let key_subject = format!("group-key-{id}");
    let value_subject = format!("group-value-{id}");

    let registry = registry();
    SchemaResolver::new(registry.clone())
        .register(&key_subject, r#""int""#, &value_subject, r#""int""#)
        .await
        .unwrap();
    create_topic(&topic, 2).await;

    let factory = MessageFactory::new(&topic, &key_subject, &value_subject, registry)
        .await
        .unwrap();
    let config = ConsumerConfig {
        brokers: brokers(),
        group_id: format!("test-group-{id}"),
        topic: topic.clone(),
        ..Default::default()
    };

    let decoded = Arc::new(AtomicUsize::new(0));
    let ctx = CancellationToken::new();
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let consumer = Consumer::connect(factory.clone(), &config).unwrap();
        let decoded = decoded.clone();
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let mut record = (0i32, 0i32);
            loop {
                match consumer.consume(&ctx, &mut record).await {
                    Ok(()) => {
                        decoded.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) if e.is_consumer_closed() => break,
                    Err(e) => panic!("unexpected consume error: {e}"),
                }
            }
            consumer.close().await.unwrap();
        }));
    }

    // Let both members join before producing.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let producer = Producer::connect(&ProducerConfig {
        brokers: brokers(),
        ..Default::default()
    })
    .unwrap();
    for i in 0..5i32 {
        producer
            .send(&factory.encode(&i, &(i * 2)).unwrap())
            .await
            .unwrap();
    }
    producer.close().await.unwrap();

    timeout(Duration::from_secs(30), async {
        while decoded.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    ctx.cancel();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(decoded.load(Ordering::SeqCst), 5);
}
