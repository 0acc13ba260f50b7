//! HTTP client for the Dynamics 365 Web API

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, StatusCode, header};
use serde_json::Value;

use super::metadata::{EntityCatalog, parse_entity_definitions};
use super::operations::{Operation, OperationResult};

pub const API_VERSION: &str = "v9.2";

const ENTITY_DEFINITIONS_QUERY: &str = "EntityDefinitions?$select=LogicalName,SchemaName,EntitySetName,PrimaryIdAttribute,PrimaryNameAttribute,IsIntersect,DisplayName\
&$expand=Attributes($select=LogicalName,AttributeType,IsValidForCreate,IsValidForUpdate),\
ManyToManyRelationships($select=SchemaName,IntersectEntityName,Entity1LogicalName,Entity1IntersectAttribute,Entity2LogicalName,Entity2IntersectAttribute),\
ManyToOneRelationships($select=ReferencingAttribute,ReferencedEntity,ReferencingEntityNavigationPropertyName)";

/// Error returned by a Web API call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The service answered with an error status
    Http {
        status: u16,
        /// Fault code from the error body (e.g. "0x80040237")
        code: Option<String>,
        message: String,
    },
    /// No answer (connection, timeout, TLS)
    Network(String),
    /// The body was not the expected JSON
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http {
                status,
                code: Some(code),
                message,
            } => write!(f, "HTTP {} ({}): {}", status, code, message),
            ApiError::Http { status, message, .. } => write!(f, "HTTP {}: {}", status, message),
            ApiError::Network(message) => write!(f, "Request failed: {}", message),
            ApiError::Decode(message) => write!(f, "Invalid response: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Map an error response onto an ApiError
///
/// Dataverse errors look like `{"error": {"code": "0x...", "message": "..."}}`.
pub fn parse_error_response(status: StatusCode, body: &str) -> ApiError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|json| json.get("error"));

    let code = error
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string());
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                body.to_string()
            }
        });

    ApiError::Http {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Authenticated client bound to one environment
#[derive(Debug, Clone)]
pub struct DynamicsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DynamicsClient {
    /// Create a client for `base_url` (e.g. "https://org.crm4.dynamics.com")
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a Web API path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/data/{}/{}", self.base_url, API_VERSION, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0")
    }

    async fn read_json(response: reqwest::Response) -> Result<Option<Value>, ApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(parse_error_response(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send a write operation
    pub async fn execute(&self, operation: &Operation) -> Result<OperationResult, ApiError> {
        let url = self.api_url(&operation.path());
        log::debug!(
            "{} {} ({})",
            operation.http_method(),
            url,
            operation.operation_type()
        );

        let mut request = self.request(operation.http_method(), &url);
        for (name, value) in operation.headers() {
            request = request.header(name, value);
        }
        if let Some(body) = operation.body() {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status_code = response.status().as_u16();
        let data = Self::read_json(response).await?;

        Ok(OperationResult { status_code, data })
    }

    /// GET a Web API path and return the JSON body
    pub async fn get_json(&self, path_or_url: &str) -> Result<Value, ApiError> {
        let url = if path_or_url.starts_with("http") {
            path_or_url.to_string()
        } else {
            self.api_url(path_or_url)
        };
        log::debug!("GET {}", url);

        let response = self
            .request(Method::GET, &url)
            .header("Prefer", "odata.include-annotations=\"*\"")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self::read_json(response).await?.unwrap_or(Value::Null))
    }

    /// Retrieve all pages of a collection, following `@odata.nextLink`
    pub async fn retrieve_all(&self, path: &str) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());

        while let Some(url) = next.take() {
            let page = self.get_json(&url).await?;
            match page.get("value").and_then(|v| v.as_array()) {
                Some(values) => items.extend(values.iter().cloned()),
                None => return Err(ApiError::Decode("collection response without value".to_string())),
            }
            next = page
                .get("@odata.nextLink")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        Ok(items)
    }

    /// Load entity, attribute and relationship metadata of the environment
    pub async fn fetch_entity_catalog(&self) -> Result<EntityCatalog> {
        log::info!("Loading metadata from {}", self.base_url);

        let definitions = self
            .get_json(ENTITY_DEFINITIONS_QUERY)
            .await
            .with_context(|| format!("Failed to load entity definitions from {}", self.base_url))?;

        let catalog = parse_entity_definitions(&definitions)?;
        log::info!("Loaded {} entity definitions", catalog.len());
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataverse_error() {
        let body = r#"{"error":{"code":"0x80040237","message":"Cannot insert duplicate key."}}"#;
        let err = parse_error_response(StatusCode::PRECONDITION_FAILED, body);

        assert_eq!(
            err,
            ApiError::Http {
                status: 412,
                code: Some("0x80040237".to_string()),
                message: "Cannot insert duplicate key.".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_plain_error() {
        let err = parse_error_response(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");

        let err = parse_error_response(StatusCode::UNAUTHORIZED, "token expired");
        assert_eq!(err.to_string(), "HTTP 401: token expired");
    }

    #[test]
    fn test_api_url() {
        let client = DynamicsClient::new("https://org.crm4.dynamics.com/", "token").unwrap();
        assert_eq!(
            client.api_url("contacts"),
            "https://org.crm4.dynamics.com/api/data/v9.2/contacts"
        );
    }
}
