use bytes::Bytes;

use crate::transport::ConsumedRecord;

/// A framed message: topic plus schema-id-tagged key and value bytes.
///
/// Built by [`crate::MessageFactory::encode`] or from a delivered record;
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: String,
    key: Bytes,
    value: Bytes,
}

impl Message {
    pub fn new(topic: impl Into<String>, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl From<&ConsumedRecord> for Message {
    /// Absent keys or values become empty byte strings, which then fail
    /// envelope validation on decode.
    fn from(record: &ConsumedRecord) -> Self {
        Self::new(
            record.topic.clone(),
            record.key.clone().unwrap_or_default(),
            record.value.clone().unwrap_or_default(),
        )
    }
}
