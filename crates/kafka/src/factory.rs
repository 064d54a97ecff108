//! Encoding and decoding of messages against a fixed pair of subjects.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use schemabus_registry::{AvroCodec, ResolvedSchema, SchemaRegistry, SchemaResolver};

use crate::error::{Error, Field, Result};
use crate::message::Message;
use crate::wire;

/// Binds a topic to the compiled key and value schemas of two subjects.
///
/// Schemas are resolved once, at construction; the factory never goes back
/// to the registry. Cloning is cheap and clones share the compiled codecs.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    topic: Arc<str>,
    key: Arc<ResolvedSchema>,
    value: Arc<ResolvedSchema>,
}

impl MessageFactory {
    /// Resolve `key_subject` and `value_subject` and bind them to `topic`.
    pub async fn new(
        topic: &str,
        key_subject: &str,
        value_subject: &str,
        registry: Arc<dyn SchemaRegistry>,
    ) -> Result<Self> {
        let resolver = SchemaResolver::new(registry);
        let key = resolver.resolve(key_subject).await?;
        let value = resolver.resolve(value_subject).await?;

        info!(
            "Message factory for topic '{}': key subject '{}' (schema id {}), value subject '{}' (schema id {})",
            topic, key.subject, key.id, value.subject, value.id
        );

        Ok(Self::from_resolved(topic, key, value))
    }

    /// Build a factory from schemas that were already resolved.
    pub fn from_resolved(topic: &str, key: ResolvedSchema, value: ResolvedSchema) -> Self {
        Self {
            topic: Arc::from(topic),
            key: Arc::new(key),
            value: Arc::new(value),
        }
    }

    /// Encode a key and value into a framed message for this factory's topic.
    pub fn encode<K, V>(&self, key: &K, value: &V) -> Result<Message>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let key_bytes = Self::encode_field(&self.key, Field::Key, key)?;
        let value_bytes = Self::encode_field(&self.value, Field::Value, value)?;
        Ok(Message::new(self.topic.as_ref(), key_bytes, value_bytes))
    }

    /// Decode `message` into `key_out` and `value_out`.
    ///
    /// Both envelopes must carry the schema ids this factory was built with.
    /// The outputs are only written when both halves decode.
    pub fn decode_into<K, V>(&self, message: &Message, key_out: &mut K, value_out: &mut V) -> Result<()>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        let (key, value) = self.decode(message)?;
        *key_out = key;
        *value_out = value;
        Ok(())
    }

    /// Decode `message` into a fresh key and value.
    pub fn decode<K, V>(&self, message: &Message) -> Result<(K, V)>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        let (key_id, key_payload) =
            wire::unframe(message.key()).map_err(|e| e.for_field(Field::Key))?;
        let (value_id, value_payload) =
            wire::unframe(message.value()).map_err(|e| e.for_field(Field::Value))?;

        Self::check_schema_id(&self.key, Field::Key, key_id)?;
        Self::check_schema_id(&self.value, Field::Value, value_id)?;

        Ok((
            Self::decode_field(&self.key, Field::Key, key_payload)?,
            Self::decode_field(&self.value, Field::Value, value_payload)?,
        ))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key_subject(&self) -> &str {
        &self.key.subject
    }

    pub fn value_subject(&self) -> &str {
        &self.value.subject
    }

    pub fn key_schema_id(&self) -> u32 {
        self.key.id
    }

    pub fn value_schema_id(&self) -> u32 {
        self.value.id
    }

    pub fn key_codec(&self) -> &AvroCodec {
        &self.key.codec
    }

    pub fn value_codec(&self) -> &AvroCodec {
        &self.value.codec
    }

    fn encode_field<T: Serialize + ?Sized>(
        schema: &ResolvedSchema,
        field: Field,
        native: &T,
    ) -> Result<Vec<u8>> {
        let payload = schema
            .codec
            .encode(native)
            .map_err(|source| Error::Encode { field, source })?;
        Ok(wire::frame(&payload, schema.id))
    }

    fn check_schema_id(schema: &ResolvedSchema, field: Field, actual: u32) -> Result<()> {
        if actual != schema.id {
            return Err(Error::SchemaMismatch {
                field,
                expected: schema.id,
                actual,
            });
        }
        Ok(())
    }

    fn decode_field<T: DeserializeOwned>(
        schema: &ResolvedSchema,
        field: Field,
        payload: &[u8],
    ) -> Result<T> {
        schema
            .codec
            .decode(payload)
            .map_err(|source| Error::Decode { field, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemabus_registry::{MemorySchemaRegistry, SchemaRegistry};
    use serde::Deserialize;

    const USER_SCHEMA: &str = r#"{
        "type": "record",
        "name": "User",
        "fields": [
            {"name": "name", "type": "string"},
            {"name": "age", "type": "int"}
        ]
    }"#;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: i32,
    }

    async fn registry() -> Arc<MemorySchemaRegistry> {
        let registry = Arc::new(MemorySchemaRegistry::new());
        registry.register_schema("int-key", r#""int""#).await.unwrap();
        registry.register_schema("int-value", r#""int""#).await.unwrap();
        registry
            .register_schema("string-key", r#""string""#)
            .await
            .unwrap();
        registry.register_schema("user-value", USER_SCHEMA).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn test_scenario_int_key_int_value() {
        let registry = registry().await;
        let factory = MessageFactory::new("numbers", "int-key", "int-value", registry.clone())
            .await
            .unwrap();

        let message = factory.encode(&42i32, &7i32).unwrap();
        assert_eq!(message.topic(), "numbers");

        let (key, value): (i32, i32) = factory.decode(&message).unwrap();
        assert_eq!((key, value), (42, 7));

        let other = MessageFactory::new("numbers", "string-key", "int-value", registry)
            .await
            .unwrap();
        let err = other.decode::<String, i32>(&message).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch {
                field: Field::Key,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_subjects_share_schema_ids() {
        // "int-key" and "int-value" carry the same definition, hence the same id.
        let registry = registry().await;
        let factory = MessageFactory::new("t", "int-key", "int-value", registry)
            .await
            .unwrap();
        assert_eq!(factory.key_schema_id(), factory.value_schema_id());
        assert_eq!(factory.key_subject(), "int-key");
        assert_eq!(factory.value_subject(), "int-value");
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let registry = registry().await;
        let factory = MessageFactory::new("users", "string-key", "user-value", registry)
            .await
            .unwrap();

        let user = User {
            name: "Ada".to_string(),
            age: 36,
        };
        let message = factory.encode("user-1", &user).unwrap();

        let mut key = String::new();
        let mut value = User::default();
        factory.decode_into(&message, &mut key, &mut value).unwrap();
        assert_eq!(key, "user-1");
        assert_eq!(value, user);
    }

    #[tokio::test]
    async fn test_framing_uses_bound_ids() {
        let registry = registry().await;
        let factory = MessageFactory::new("users", "string-key", "user-value", registry)
            .await
            .unwrap();
        let message = factory
            .encode("k", &User {
                name: "x".to_string(),
                age: 1,
            })
            .unwrap();

        let (key_id, _) = wire::unframe(message.key()).unwrap();
        let (value_id, _) = wire::unframe(message.value()).unwrap();
        assert_eq!(key_id, factory.key_schema_id());
        assert_eq!(value_id, factory.value_schema_id());
    }

    #[tokio::test]
    async fn test_value_schema_mismatch() {
        let registry = registry().await;
        let ints = MessageFactory::new("t", "int-key", "int-value", registry.clone())
            .await
            .unwrap();
        let users = MessageFactory::new("t", "int-key", "user-value", registry)
            .await
            .unwrap();

        let message = ints.encode(&1i32, &2i32).unwrap();
        let err = users.decode::<i32, User>(&message).unwrap_err();
        match err {
            Error::SchemaMismatch {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, Field::Value);
                assert_eq!(expected, users.value_schema_id());
                assert_eq!(actual, ints.value_schema_id());
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encode_rejects_nonconforming_value() {
        let registry = registry().await;
        let factory = MessageFactory::new("t", "int-key", "user-value", registry)
            .await
            .unwrap();

        let err = factory.encode(&1i32, "not a user").unwrap_err();
        assert!(matches!(
            err,
            Error::Encode {
                field: Field::Value,
                ..
            }
        ));

        let err = factory
            .encode("not an int", &User::default())
            .unwrap_err();
        assert!(matches!(err, Error::Encode { field: Field::Key, .. }));
    }

    #[tokio::test]
    async fn test_encode_rejects_wide_int_instead_of_truncating() {
        let registry = registry().await;
        let factory = MessageFactory::new("numbers", "int-key", "int-value", registry)
            .await
            .unwrap();

        let err = factory.encode(&5_000_000_000i64, &7i64).unwrap_err();
        assert!(matches!(
            err,
            Error::Encode {
                field: Field::Key,
                source: schemabus_registry::CodecError::IntOutOfRange(5_000_000_000),
            }
        ));

        let message = factory.encode(&i64::from(i32::MAX), &7i64).unwrap();
        let (key, value): (i64, i64) = factory.decode(&message).unwrap();
        assert_eq!((key, value), (i64::from(i32::MAX), 7));
    }

    #[tokio::test]
    async fn test_decode_malformed_envelope() {
        let registry = registry().await;
        let factory = MessageFactory::new("t", "int-key", "int-value", registry)
            .await
            .unwrap();

        let good = factory.encode(&1i32, &2i32).unwrap();

        let short_key = Message::new("t", vec![0u8, 0, 0], good.value().to_vec());
        assert!(matches!(
            factory.decode::<i32, i32>(&short_key),
            Err(Error::MalformedEnvelope {
                field: Field::Key,
                ..
            })
        ));

        let mut bad_magic = good.value().to_vec();
        bad_magic[0] = 1;
        let bad_value = Message::new("t", good.key().to_vec(), bad_magic);
        assert!(matches!(
            factory.decode::<i32, i32>(&bad_value),
            Err(Error::MalformedEnvelope {
                field: Field::Value,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_decode_error_leaves_outputs_untouched() {
        let registry = registry().await;
        let factory = MessageFactory::new("t", "int-key", "int-value", registry)
            .await
            .unwrap();
        // Right schema id, but the value payload is empty.
        let message = Message::new(
            "t",
            wire::frame(&factory.key_codec().encode(&5i32).unwrap(), factory.key_schema_id()),
            wire::frame(&[], factory.value_schema_id()),
        );

        let mut key = -1i32;
        let mut value = -1i32;
        let err = factory
            .decode_into(&message, &mut key, &mut value)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                field: Field::Value,
                ..
            }
        ));
        assert_eq!((key, value), (-1, -1));
    }

    #[tokio::test]
    async fn test_new_fails_for_unknown_subject() {
        let registry = registry().await;
        let err = MessageFactory::new("t", "int-key", "missing-value", registry)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(schemabus_registry::Error::Resolution { subject, .. }) if subject == "missing-value"
        ));
    }

    #[tokio::test]
    async fn test_new_fails_when_registry_unreachable() {
        let registry = registry().await;
        registry.set_available(false);
        let err = MessageFactory::new("t", "int-key", "int-value", registry)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(schemabus_registry::Error::Resolution { .. })
        ));
    }

    #[tokio::test]
    async fn test_factory_is_shareable_across_tasks() {
        let registry = registry().await;
        let factory = MessageFactory::new("t", "int-key", "int-value", registry)
            .await
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let factory = factory.clone();
                tokio::spawn(async move {
                    let message = factory.encode(&i, &(i * 10)).unwrap();
                    factory.decode::<i32, i32>(&message).unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let i = i as i32;
            assert_eq!(handle.await.unwrap(), (i, i * 10));
        }
    }
}
