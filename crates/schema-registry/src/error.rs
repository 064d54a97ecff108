use thiserror::Error;

/// Errors reported by a schema registry backend.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The subject has no registered schemas.
    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    /// The subject exists but the given definition is not one of its versions.
    #[error("Schema not found under subject: {0}")]
    SchemaNotFound(String),

    #[error("Schema registry request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Schema registry returned status {status} (error code {error_code}): {message}")]
    Api {
        status: u16,
        error_code: i64,
        message: String,
    },

    #[error("Invalid schema registry URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Schema registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    /// Whether this error means "nothing is registered for this subject/definition yet".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::SubjectNotFound(_) | RegistryError::SchemaNotFound(_)
        )
    }
}

/// Errors raised while compiling a schema or running values through it.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported schema type: {0}")]
    UnsupportedSchemaType(String),

    #[error("Invalid Avro schema: {0}")]
    InvalidSchema(#[source] apache_avro::Error),

    #[error("Value does not conform to schema: {0}")]
    Encode(#[source] apache_avro::Error),

    #[error("Value {0} is outside the range of the schema's int type")]
    IntOutOfRange(i64),

    #[error("Payload does not conform to schema: {0}")]
    Decode(#[source] apache_avro::Error),
}

/// Errors surfaced by the schema resolver.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to resolve subject '{subject}': {source}")]
    Resolution {
        subject: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to compile schema for subject '{subject}': {source}")]
    CodecCompile {
        subject: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to check registration of subject '{subject}': {source}")]
    RegistrationCheck {
        subject: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to register schema for subject '{subject}': {source}")]
    Registration {
        subject: String,
        #[source]
        source: RegistryError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
