use schemabus_registry::CodecError;
use std::fmt;
use thiserror::Error;

/// Error type produced by transport implementations.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which half of a message an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Key,
    Value,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// Why a consumer stopped delivering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// `Consumer::close` was called.
    Closed,
    /// The transport closed its message channel.
    ChannelClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Closed => write!(f, "closed"),
            Self::ChannelClosed => write!(f, "message channel closed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed {field} envelope: {reason}")]
    MalformedEnvelope { field: Field, reason: String },

    #[error("Schema mismatch on {field}: expected schema id {expected}, got {actual}")]
    SchemaMismatch {
        field: Field,
        expected: u32,
        actual: u32,
    },

    #[error("Failed to encode {field}: {source}")]
    Encode {
        field: Field,
        #[source]
        source: CodecError,
    },

    #[error("Failed to decode {field}: {source}")]
    Decode {
        field: Field,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Registry(#[from] schemabus_registry::Error),

    /// End of stream: the consumer was closed or the caller cancelled.
    #[error("Consumer closed ({0})")]
    ConsumerClosed(CloseReason),

    #[error("Transport {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this is the end-of-stream sentinel rather than a failure.
    pub fn is_consumer_closed(&self) -> bool {
        matches!(self, Error::ConsumerClosed(_))
    }

    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        Error::Transport { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
