//! REST client for the gateway over mutually authenticated TLS

use std::path::Path;
use std::time::Duration;

use reqwest::{Certificate, Client, Identity, Method};
use serde_json::Value;
use tracing::{error, info};

use super::catalog::{ApiCatalog, ApiSpec};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::oracle::{parse_metrics, validate_body, ExpectationTable, MetricsSnapshot};

/// API key of the metrics exposition endpoint
pub const METRICS_API: &str = "get_metrics";

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

impl ApiBody {
    /// JSON when the text parses as JSON, raw text otherwise
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// `status: None` means the request never got an HTTP response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: Option<u16>,
    pub body: Option<ApiBody>,
}

#[derive(Debug, Clone)]
pub struct AlgClient {
    http: Client,
    base_url: String,
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    if path.as_os_str().is_empty() {
        return Err(Error::missing_config("tls", what));
    }
    std::fs::read(path).map_err(|e| Error::file_read(path, e))
}

impl AlgClient {
    /// Client for `https://<domain_name>:<port>` presenting the configured
    /// client identity and trusting only the configured CA
    pub fn new(config: &Config) -> Result<Self> {
        if config.alg.domain_name.is_empty() {
            return Err(Error::missing_config("alg", "domain_name"));
        }

        let mut identity_pem = read_pem(&config.tls.cert, "cert")?;
        identity_pem.push(b'\n');
        identity_pem.extend(read_pem(&config.tls.key, "key")?);
        let identity = Identity::from_pem(&identity_pem)
            .map_err(|e| Error::Config(format!("Invalid client certificate or key: {e}")))?;
        let ca = Certificate::from_pem(&read_pem(&config.tls.ca, "ca")?)
            .map_err(|e| Error::Config(format!("Invalid CA bundle: {e}")))?;

        let http = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .build()
            .map_err(|e| Error::Api(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(
            http,
            format!("https://{}:{}", config.alg.domain_name, config.alg.port),
        ))
    }

    /// Use a prepared client against `base_url` (no trailing slash)
    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Send one declared call
    pub async fn call(&self, spec: &ApiSpec) -> ApiResponse {
        let method = match Method::from_bytes(spec.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                error!("Invalid HTTP method '{}'", spec.method);
                return ApiResponse::default();
            }
        };
        info!(
            "Running Rest API - {} - {} from REST Client to ALG Server",
            spec.api_path, method
        );

        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, spec.api_path));
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = spec.body() {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Request failed: {}", e);
                error!("No response returned from ALG server");
                return ApiResponse::default();
            }
        };

        let status = response.status().as_u16();
        info!("Received response - [{}] - from the ALG Server", status);
        match response.text().await {
            Ok(text) => ApiResponse {
                status: Some(status),
                body: Some(ApiBody::parse(text)),
            },
            Err(e) => {
                error!("Failed to read response body: {}", e);
                ApiResponse {
                    status: Some(status),
                    body: None,
                }
            }
        }
    }

    /// Send the call declared under `key`; an unknown key yields an empty response
    pub async fn trigger(&self, catalog: &ApiCatalog, key: &str) -> ApiResponse {
        match catalog.get(key) {
            Ok(spec) => self.call(spec).await,
            Err(e) => {
                error!("{}", e);
                ApiResponse::default()
            }
        }
    }

    /// Current metrics, `None` when the endpoint returned nothing
    pub async fn metrics(&self, catalog: &ApiCatalog) -> Option<MetricsSnapshot> {
        let body = self.trigger(catalog, METRICS_API).await.body?;
        Some(parse_metrics(&body.to_text()))
    }

    /// Call `api_key` and require its body to match `expected_key` in the table
    pub async fn validate(
        &self,
        catalog: &ApiCatalog,
        table: &ExpectationTable,
        api_key: &str,
        expected_key: &str,
    ) -> Result<()> {
        let expected = table
            .get(expected_key)
            .ok_or_else(|| Error::Config(format!("No expected values for '{expected_key}'")))?;

        let Some(body) = self.trigger(catalog, api_key).await.body else {
            error!("[Failure] No response received");
            return Err(Error::assertion("No response received from ALG Server"));
        };
        validate_body(expected, &body.to_value())
            .into_result(format!("Response of '{api_key}' does not match '{expected_key}'"))
    }
}
