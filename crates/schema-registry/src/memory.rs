//! In-process schema registry.
//!
//! Behaves like a Confluent registry for the three operations the messaging
//! core needs: a global id sequence, per-subject version lists, and
//! idempotent registration of identical definitions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{RegisteredSchema, SchemaRegistry, SchemaType};

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    /// Definition key -> id, shared across subjects like a real registry.
    ids: HashMap<String, u32>,
    subjects: HashMap<String, Vec<RegisteredSchema>>,
    registrations: usize,
}

/// Schema registry kept entirely in memory.
#[derive(Debug)]
pub struct MemorySchemaRegistry {
    state: RwLock<State>,
    available: AtomicBool,
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1,
                ..Default::default()
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the registry going offline (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of new schema versions created so far.
    pub async fn registration_count(&self) -> usize {
        self.state.read().await.registrations
    }

    /// All versions registered under `subject`, oldest first.
    pub async fn versions(&self, subject: &str) -> Vec<RegisteredSchema> {
        self.state
            .read()
            .await
            .subjects
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::Unavailable(
                "in-memory registry is offline".to_string(),
            ))
        }
    }
}

const INVALID_SCHEMA_STATUS: u16 = 422;
const INVALID_SCHEMA_CODE: i64 = 42201;

/// Identity used to compare definitions: the Avro canonical form.
///
/// Definitions that do not parse are rejected the way a Confluent registry
/// rejects them, with a 422 / 42201 response.
fn definition_key(schema: &str) -> Result<String, RegistryError> {
    apache_avro::Schema::parse_str(schema)
        .map(|parsed| parsed.canonical_form())
        .map_err(|e| RegistryError::Api {
            status: INVALID_SCHEMA_STATUS,
            error_code: INVALID_SCHEMA_CODE,
            message: format!("Invalid schema: {e}"),
        })
}

fn same_definition(stored: &RegisteredSchema, key: &str) -> bool {
    definition_key(&stored.schema).is_ok_and(|stored_key| stored_key == key)
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    async fn latest_schema(&self, subject: &str) -> Result<RegisteredSchema, RegistryError> {
        self.check_available()?;
        let state = self.state.read().await;
        state
            .subjects
            .get(subject)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))
    }

    async fn is_registered(
        &self,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema, RegistryError> {
        self.check_available()?;
        let key = definition_key(schema)?;
        let state = self.state.read().await;
        let versions = state
            .subjects
            .get(subject)
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        versions
            .iter()
            .find(|v| same_definition(v, &key))
            .cloned()
            .ok_or_else(|| RegistryError::SchemaNotFound(subject.to_string()))
    }

    async fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, RegistryError> {
        self.check_available()?;
        let key = definition_key(schema)?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Some(existing) = state
            .subjects
            .get(subject)
            .and_then(|versions| versions.iter().find(|v| same_definition(v, &key)))
        {
            return Ok(existing.id);
        }

        let id = match state.ids.get(&key).copied() {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.ids.insert(key, id);
                id
            }
        };

        let versions = state.subjects.entry(subject.to_string()).or_default();
        let version = versions.len() as i32 + 1;
        versions.push(RegisteredSchema {
            subject: subject.to_string(),
            id,
            version,
            schema: schema.to_string(),
            schema_type: SchemaType::Avro,
        });
        state.registrations += 1;

        debug!("Registered schema id {id} as version {version} of subject '{subject}'");
        Ok(id)
    }
}
