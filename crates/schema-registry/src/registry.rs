//! Schema registry contract and shared types.
//!
//! The registry is an external service. This module only defines what the
//! resolver needs from it; [`crate::HttpSchemaRegistry`] talks to a
//! Confluent-compatible server and [`crate::MemorySchemaRegistry`] keeps
//! everything in process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RegistryError;

/// Kind of definition stored under a subject.
///
/// Registries omit the type for Avro schemas, hence the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    Avro,
    Json,
    Protobuf,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avro => write!(f, "AVRO"),
            Self::Json => write!(f, "JSON"),
            Self::Protobuf => write!(f, "PROTOBUF"),
        }
    }
}

/// A schema version as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredSchema {
    /// Subject the version belongs to
    pub subject: String,
    /// Globally unique schema id, embedded in every framed payload
    pub id: u32,
    /// Version number within the subject
    pub version: i32,
    /// Schema definition
    pub schema: String,
    #[serde(default)]
    pub schema_type: SchemaType,
}

/// Operations the messaging core consumes from a schema registry.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Fetch the latest version registered under `subject`.
    async fn latest_schema(&self, subject: &str) -> Result<RegisteredSchema, RegistryError>;

    /// Look up `schema` under `subject`.
    ///
    /// Returns [`RegistryError::SubjectNotFound`] or
    /// [`RegistryError::SchemaNotFound`] when the definition is not registered.
    async fn is_registered(
        &self,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema, RegistryError>;

    /// Register `schema` as a new version of `subject` and return its id.
    ///
    /// Registering a definition identical to an existing version returns the
    /// existing id.
    async fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, RegistryError>;
}
