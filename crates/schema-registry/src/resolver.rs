//! Subject resolution and idempotent schema registration.

use std::sync::Arc;
use tracing::{debug, info};

use crate::codec::AvroCodec;
use crate::error::{Error, RegistryError, Result};
use crate::registry::{RegisteredSchema, SchemaRegistry};

/// A subject's latest schema, compiled.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub subject: String,
    /// Schema id the codec was compiled against
    pub id: u32,
    pub version: i32,
    pub codec: AvroCodec,
}

/// Outcome of asking the registry whether a definition is registered.
#[derive(Debug)]
pub enum RegistrationStatus {
    Found(RegisteredSchema),
    /// The subject has no schemas yet, or none matching the definition.
    NotFound,
    CheckFailed(RegistryError),
}

impl RegistrationStatus {
    pub fn classify(result: std::result::Result<RegisteredSchema, RegistryError>) -> Self {
        match result {
            Ok(schema) => Self::Found(schema),
            Err(e) if e.is_not_found() => Self::NotFound,
            Err(e) => Self::CheckFailed(e),
        }
    }
}

/// Resolves subjects into codecs and keeps registrations idempotent.
#[derive(Clone)]
pub struct SchemaResolver {
    registry: Arc<dyn SchemaRegistry>,
}

impl SchemaResolver {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.registry
    }

    /// Fetch the latest schema of `subject` and compile it.
    pub async fn resolve(&self, subject: &str) -> Result<ResolvedSchema> {
        let latest = self
            .registry
            .latest_schema(subject)
            .await
            .map_err(|e| Error::Resolution {
                subject: subject.to_string(),
                source: e,
            })?;

        let codec = AvroCodec::compile(&latest.schema, latest.schema_type).map_err(|e| {
            Error::CodecCompile {
                subject: subject.to_string(),
                source: e,
            }
        })?;

        debug!(
            "Resolved subject '{}' to schema id {} (version {})",
            subject, latest.id, latest.version
        );

        Ok(ResolvedSchema {
            subject: subject.to_string(),
            id: latest.id,
            version: latest.version,
            codec,
        })
    }

    /// Make sure both subjects carry the given definitions.
    ///
    /// Safe to call on every startup: definitions that are already
    /// registered are left alone.
    pub async fn register(
        &self,
        key_subject: &str,
        key_schema: &str,
        value_subject: &str,
        value_schema: &str,
    ) -> Result<()> {
        self.ensure_registered(key_subject, key_schema).await?;
        self.ensure_registered(value_subject, value_schema).await?;
        Ok(())
    }

    /// Register `schema` under `subject` unless it is already there.
    ///
    /// Returns the new schema id, or `None` when nothing had to be registered.
    pub async fn ensure_registered(&self, subject: &str, schema: &str) -> Result<Option<u32>> {
        let lookup = self.registry.is_registered(subject, schema).await;
        let status = RegistrationStatus::classify(lookup);

        match status {
            RegistrationStatus::Found(existing) => {
                debug!(
                    "Schema already registered under '{}' as id {} (version {})",
                    subject, existing.id, existing.version
                );
                Ok(None)
            }
            RegistrationStatus::CheckFailed(e) => Err(Error::RegistrationCheck {
                subject: subject.to_string(),
                source: e,
            }),
            RegistrationStatus::NotFound => {
                // A racing caller may have registered the same definition in the
                // meantime; the registry then hands back the existing id.
                let id = self
                    .registry
                    .register_schema(subject, schema)
                    .await
                    .map_err(|e| Error::Registration {
                        subject: subject.to_string(),
                        source: e,
                    })?;
                info!("Registered schema under subject '{subject}' with id {id}");
                Ok(Some(id))
            }
        }
    }
}
