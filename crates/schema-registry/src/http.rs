//! HTTP client for Confluent-compatible schema registries.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{RegisteredSchema, SchemaRegistry};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Registry error code for "subject not found".
const SUBJECT_NOT_FOUND: i64 = 40401;
/// Registry error code for "schema not found".
const SCHEMA_NOT_FOUND: i64 = 40403;

/// Connection settings for [`HttpSchemaRegistry`].
#[derive(Debug, Clone)]
pub struct HttpRegistryConfig {
    /// Base URL of the registry, e.g. `http://localhost:8081`
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
}

impl Default for HttpRegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(10),
            username: None,
            password: None,
        }
    }
}

#[derive(Serialize)]
struct SchemaRequest<'a> {
    schema: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error_code: i64,
    message: String,
}

/// Schema registry reached over its REST API.
#[derive(Debug, Clone)]
pub struct HttpSchemaRegistry {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpSchemaRegistry {
    pub fn new(config: HttpRegistryConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&config.url).map_err(|e| RegistryError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl {
                url: config.url,
                reason: "URL cannot be used as a base".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::Http {
                url: config.url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    /// Client with default settings for the given base URL.
    pub fn from_url(url: &str) -> Result<Self, RegistryError> {
        Self::new(HttpRegistryConfig {
            url: url.to_string(),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `<base>/subjects/<subject>/<rest...>` with every segment percent-encoded.
    fn subject_url(&self, subject: &str, rest: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("subjects")
                .push(subject)
                .extend(rest);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, url: &Url, request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = self
            .authorize(request)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| RegistryError::Http {
                url: url.to_string(),
                source: e,
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (error_code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => (err.error_code, err.message),
            Err(_) => (i64::from(status), body),
        };
        Err(RegistryError::Api {
            status,
            error_code,
            message,
        })
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        url: &Url,
        response: Response,
    ) -> Result<T, RegistryError> {
        response.json::<T>().await.map_err(|e| RegistryError::Http {
            url: url.to_string(),
            source: e,
        })
    }
}

/// Map the registry's not-found error codes onto the typed variants.
fn classify_not_found(subject: &str, err: RegistryError) -> RegistryError {
    match err {
        RegistryError::Api {
            status: 404,
            error_code: SUBJECT_NOT_FOUND,
            ..
        } => RegistryError::SubjectNotFound(subject.to_string()),
        RegistryError::Api {
            status: 404,
            error_code: SCHEMA_NOT_FOUND,
            ..
        } => RegistryError::SchemaNotFound(subject.to_string()),
        other => other,
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn latest_schema(&self, subject: &str) -> Result<RegisteredSchema, RegistryError> {
        let url = self.subject_url(subject, &["versions", "latest"]);
        debug!("Fetching latest schema for subject '{subject}' from {url}");

        let response = self
            .send(&url, self.client.get(url.clone()))
            .await
            .map_err(|e| classify_not_found(subject, e))?;
        Self::parse(&url, response).await
    }

    async fn is_registered(
        &self,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema, RegistryError> {
        let url = self.subject_url(subject, &[]);
        debug!("Checking registration of subject '{subject}' at {url}");

        let request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&SchemaRequest { schema });
        let response = self
            .send(&url, request)
            .await
            .map_err(|e| classify_not_found(subject, e))?;
        Self::parse(&url, response).await
    }

    async fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, RegistryError> {
        let url = self.subject_url(subject, &["versions"]);
        debug!("Registering schema for subject '{subject}' at {url}");

        let request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&SchemaRequest { schema });
        let response = self.send(&url, request).await?;
        let registered: RegisterResponse = Self::parse(&url, response).await?;
        Ok(registered.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_url_encodes_segments() {
        let registry = HttpSchemaRegistry::from_url("http://registry:8081/").unwrap();
        let url = registry.subject_url("orders value/v1", &["versions", "latest"]);
        assert_eq!(
            url.as_str(),
            "http://registry:8081/subjects/orders%20value%2Fv1/versions/latest"
        );
    }

    #[test]
    fn test_subject_url_keeps_base_path() {
        let registry = HttpSchemaRegistry::from_url("http://proxy/registry").unwrap();
        let url = registry.subject_url("s", &[]);
        assert_eq!(url.as_str(), "http://proxy/registry/subjects/s");
    }

    #[test]
    fn test_invalid_url() {
        let result = HttpSchemaRegistry::from_url("not a url");
        assert!(matches!(result, Err(RegistryError::InvalidUrl { .. })));

        let result = HttpSchemaRegistry::from_url("mailto:someone@example.com");
        assert!(matches!(result, Err(RegistryError::InvalidUrl { .. })));
    }

    #[test]
    fn test_classify_not_found() {
        let api = |error_code| RegistryError::Api {
            status: 404,
            error_code,
            message: "not found".to_string(),
        };
        assert!(matches!(
            classify_not_found("s", api(40401)),
            RegistryError::SubjectNotFound(_)
        ));
        assert!(matches!(
            classify_not_found("s", api(40403)),
            RegistryError::SchemaNotFound(_)
        ));
        assert!(matches!(
            classify_not_found("s", api(40402)),
            RegistryError::Api {
                error_code: 40402,
                ..
            }
        ));
    }
}
