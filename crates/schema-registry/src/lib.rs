//! Schema registry client library for schemabus.
//!
//! This crate provides:
//!
//! - [`SchemaRegistry`]: the registry operations the messaging core depends on
//!   (latest schema by subject, registration lookup, registration)
//! - [`HttpSchemaRegistry`]: a client for Confluent-compatible registries
//! - [`MemorySchemaRegistry`]: an in-process registry for tests and local runs
//! - [`AvroCodec`]: a compiled Avro encoder/decoder for one definition
//! - [`SchemaResolver`]: subject resolution and idempotent registration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schemabus_registry::{HttpSchemaRegistry, SchemaResolver};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(HttpSchemaRegistry::from_url("http://localhost:8081")?);
//! let resolver = SchemaResolver::new(registry);
//!
//! resolver
//!     .register("orders-key", r#""string""#, "orders-value", r#""long""#)
//!     .await?;
//! let resolved = resolver.resolve("orders-value").await?;
//! println!("orders-value is schema id {}", resolved.id);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod http;
pub mod memory;
pub mod registry;
pub mod resolver;

pub use codec::AvroCodec;
pub use error::{CodecError, Error, RegistryError, Result};
pub use http::{HttpRegistryConfig, HttpSchemaRegistry};
pub use memory::MemorySchemaRegistry;
pub use registry::{RegisteredSchema, SchemaRegistry, SchemaType};
pub use resolver::{RegistrationStatus, ResolvedSchema, SchemaResolver};
