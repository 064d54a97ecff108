use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use schemabus::kafka::{
    Consumer, ConsumerConfig, Error, Field, KeyValue, MessageFactory, Producer, ProducerConfig,
};
use schemabus::registry::SchemaResolver;

use crate::{brokers, create_topic, init_tracing, registry, test_id};

#[tokio::test]
#[ignore = "requires Kafka and a schema registry"]
async fn test_int_key_int_value_round_trip() {
    init_tracing();
    let id = test_id();
    let topic = format!("test-ints-{id}");
    let int_key = format!("int-key-{id}");
    let int_value = format!("int-value-{id}");
    let string_key = format!("string-key-{id}");

    let registry = registry();
    let resolver = SchemaResolver::new(registry.clone());
    resolver
        .register(&int_key, r#""int""#, &int_value, r#""int""#)
        .await
        .unwrap();
    resolver
        .ensure_registered(&string_key, r#""string""#)
        .await
        .unwrap();
    // Registering again is a no-op.
    assert_eq!(
        resolver.ensure_registered(&int_key, r#""int""#).await.unwrap(),
        None
    );

    create_topic(&topic, 1).await;

    let factory = MessageFactory::new(&topic, &int_key, &int_value, registry.clone())
        .await
        .unwrap();
    let producer = Producer::connect(&ProducerConfig {
        brokers: brokers(),
        ..Default::default()
    })
    .unwrap();
    producer
        .send(&factory.encode(&42i32, &7i32).unwrap())
        .await
        .unwrap();
    producer.close().await.unwrap();

    let config = ConsumerConfig {
        brokers: brokers(),
        group_id: format!("test-group-{id}"),
        topic: topic.clone(),
        ..Default::default()
    };
    let consumer = Consumer::connect(factory, &config).unwrap();
    let ctx = CancellationToken::new();
    let mut record = KeyValue::<i32, i32>::default();
    timeout(Duration::from_secs(30), consumer.consume(&ctx, &mut record))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((record.key, record.value), (42, 7));
    consumer.close().await.unwrap();

    // Same message, decoded by a factory bound to a different key subject.
    let message = MessageFactory::new(&topic, &int_key, &int_value, registry.clone())
        .await
        .unwrap()
        .encode(&42i32, &7i32)
        .unwrap();
    let mismatched = MessageFactory::new(&topic, &string_key, &int_value, registry)
        .await
        .unwrap();
    let err = mismatched.decode::<String, i32>(&message).unwrap_err();
    assert!(matches!(
        err,
        Error::SchemaMismatch {
            field: Field::Key,
            ..
        }
    ));
}

#[tokio::test]
#[ignore = "requires Kafka and a schema registry"]
async fn test_cancelled_consume_returns_promptly() {
    init_tracing();
    let id = test_id();
    let topic = format!("test-idle-{id}");
    let key_subject = format!("idle-key-{id}");
    let value_subject = format!("idle-value-{id}");

    let registry = registry();
    SchemaResolver::new(registry.clone())
        .register(&key_subject, r#""string""#, &value_subject, r#""long""#)
        .await
        .unwrap();
    create_topic(&topic, 1).await;

    let factory = MessageFactory::new(&topic, &key_subject, &value_subject, registry)
        .await
        .unwrap();
    let config = ConsumerConfig {
        brokers: brokers(),
        group_id: format!("test-group-{id}"),
        ..Default::default()
    };
    let consumer = Consumer::connect(factory, &config).unwrap();

    let ctx = CancellationToken::new();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });

    let mut record = KeyValue::<String, i64>::default();
    let err = timeout(Duration::from_secs(5), consumer.consume(&ctx, &mut record))
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_consumer_closed());
    consumer.close().await.unwrap();
}
