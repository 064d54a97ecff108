//! Binding of decoded messages into caller-defined records.

use serde::de::DeserializeOwned;

/// A record with one key field and one value field the consumer fills in.
///
/// ```
/// use schemabus_kafka::Record;
/// use serde::Deserialize;
///
/// #[derive(Default, Deserialize)]
/// struct OrderPlaced {
///     order_id: String,
///     amount: i64,
/// }
///
/// #[derive(Default)]
/// struct OrderEvent {
///     customer: String,
///     order: OrderPlaced,
///     received_by: &'static str,
/// }
///
/// impl Record for OrderEvent {
///     type Key = String;
///     type Value = OrderPlaced;
///
///     fn key_mut(&mut self) -> &mut String {
///         &mut self.customer
///     }
///
///     fn value_mut(&mut self) -> &mut OrderPlaced {
///         &mut self.order
///     }
/// }
/// ```
pub trait Record {
    type Key: DeserializeOwned;
    type Value: DeserializeOwned;

    fn key_mut(&mut self) -> &mut Self::Key;
    fn value_mut(&mut self) -> &mut Self::Value;
}

impl<K: DeserializeOwned, V: DeserializeOwned> Record for (K, V) {
    type Key = K;
    type Value = V;

    fn key_mut(&mut self) -> &mut K {
        &mut self.0
    }

    fn value_mut(&mut self) -> &mut V {
        &mut self.1
    }
}

/// Plain key/value record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: DeserializeOwned, V: DeserializeOwned> Record for KeyValue<K, V> {
    type Key = K;
    type Value = V;

    fn key_mut(&mut self) -> &mut K {
        &mut self.key
    }

    fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }
}
