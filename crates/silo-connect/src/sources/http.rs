//! HTTP/REST source connector
//!
//! Fetches one endpoint per query. JSON responses become structured
//! payloads; anything else is kept as raw text. Clients come from the
//! session cache keyed by base URL, auth, and timeout.

use crate::config::{ConfigLoader, ConnectorConfig};
use crate::contract::{Connector, IngestedItem, IngestionResult};
use crate::error::{ConnectError, Result};
use crate::registry::{ConnectorContext, ConnectorRegistry};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT_SECONDS: i64 = 30;

/// Register under the `http` protocol (see `ConnectorRegistry::builtin`)
pub fn create(
    config: &ConnectorConfig,
    context: &ConnectorContext,
) -> Result<Box<dyn Connector>> {
    let merged = ConfigLoader::new()
        .default_value("timeout_seconds", json!(DEFAULT_TIMEOUT_SECONDS))
        .env_prefix("HTTP")
        .explicit(config)
        .required(&["base_url"])
        .load()?;

    let base_url = normalize_base_url(&merged.require_str("base_url")?)?;
    let token = merged.get_str("token").filter(|t| !t.trim().is_empty());
    let timeout_seconds = merged.i64_or("timeout_seconds", DEFAULT_TIMEOUT_SECONDS);
    if timeout_seconds <= 0 {
        return Err(ConnectError::configuration(
            "timeout_seconds must be greater than zero",
        ));
    }

    Ok(Box::new(HttpConnector {
        base_url,
        token,
        timeout_seconds: timeout_seconds as u64,
        sessions: Arc::clone(&context.sessions),
        reuse: context.reuse,
        client: None,
    }))
}

pub struct HttpConnector {
    base_url: String,
    token: Option<String>,
    timeout_seconds: u64,
    sessions: Arc<crate::cache::SessionCache>,
    reuse: bool,
    client: Option<reqwest::Client>,
}

impl HttpConnector {
    fn session_config(&self) -> ConnectorConfig {
        let mut config = ConnectorConfig::new();
        config.insert("base_url", json!(self.base_url));
        config.insert("timeout_seconds", json!(self.timeout_seconds));
        if let Some(ref token) = self.token {
            config.insert("token", json!(token));
        }
        config
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref token) = self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ConnectError::configuration("token contains characters invalid in a header")
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn request_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&mut self) -> Result<()> {
        info!(config = %self.session_config().redacted(), "Connecting HTTP connector");

        let headers = self.default_headers()?;
        let timeout = Duration::from_secs(self.timeout_seconds);

        let client = self.sessions.get_or_create(
            "rest",
            &self.session_config(),
            self.reuse,
            || {
                Ok(reqwest::Client::builder()
                    .default_headers(headers)
                    .timeout(timeout)
                    .build()?)
            },
        )?;

        self.client = Some(client);
        debug!("HTTP connector ready");
        Ok(())
    }

    async fn fetch_data(&mut self, query: &str) -> Result<IngestionResult> {
        if query.trim().is_empty() {
            return Err(ConnectError::configuration(
                "query cannot be empty. Expected an endpoint path like '/health'",
            ));
        }

        let client = self.client.as_ref().ok_or_else(|| {
            ConnectError::connection("HTTP connector is not connected. Call connect() first")
        })?;

        let url = self.request_url(query);
        debug!(url = %url, "Fetching HTTP endpoint");

        let response = client.get(url.as_str()).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        let response = response.error_for_status()?;
        let body = response.text().await?;

        let payload = if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(value) => value,
                Err(_) => {
                    warn!("Failed to decode JSON payload, keeping raw text");
                    Value::String(body)
                }
            }
        } else {
            Value::String(body)
        };

        Ok(
            IngestionResult::success("http", vec![IngestedItem::from_payload(payload)])
                .with_metadata("status_code", json!(status.as_u16())),
        )
    }

    async fn close(&mut self) {
        debug!("Closing HTTP connector");
        self.client = None;
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConnectError::configuration("base_url cannot be empty"));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Probe an HTTP source, swallowing failures into a boolean
pub async fn test_connection(
    registry: &ConnectorRegistry,
    config: &ConnectorConfig,
    endpoint: &str,
) -> bool {
    let mut full = config.clone();
    full.insert("protocol", json!("http"));

    let mut connector = match registry.create(&full) {
        Ok(connector) => connector,
        Err(error) => {
            warn!(error = %error, "HTTP connection probe failed to construct connector");
            return false;
        }
    };

    let healthy = match connector.connect().await {
        Ok(()) => connector.fetch_data(endpoint).await.is_ok(),
        Err(_) => false,
    };

    connector.close().await;
    healthy
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config(base_url: &str) -> ConnectorConfig {
        let mut config = ConnectorConfig::new();
        config.insert("base_url", json!(base_url));
        config
    }

    fn connector_for(base_url: &str) -> Box<dyn Connector> {
        create(&http_config(base_url), &ConnectorContext::new()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_parses_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "val": "a"}])),
            )
            .mount(&server)
            .await;

        let mut connector = connector_for(&server.uri());
        connector.connect().await.unwrap();
        let result = connector.fetch_data("/items").await.unwrap();
        connector.close().await;

        assert!(result.success);
        assert_eq!(result.items.len(), 1);
        assert_eq!(
            result.items[0].payload,
            Some(json!([{"id": 1, "val": "a"}]))
        );
        assert_eq!(result.metadata.get("status_code"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn test_fetch_keeps_non_json_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let mut connector = connector_for(&server.uri());
        connector.connect().await.unwrap();
        let result = connector.fetch_data("plain").await.unwrap();

        assert_eq!(result.items[0].payload, Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_error_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut connector = connector_for(&server.uri());
        connector.connect().await.unwrap();
        assert!(connector.fetch_data("/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_bearer_token_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut config = http_config(&server.uri());
        config.insert("token", json!("sekrit"));
        let mut connector = create(&config, &ConnectorContext::new()).unwrap();

        connector.connect().await.unwrap();
        let result = connector.fetch_data("/secure").await.unwrap();
        assert_eq!(result.items[0].payload, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let server = MockServer::start().await;
        let mut connector = connector_for(&server.uri());
        connector.connect().await.unwrap();
        assert!(connector.fetch_data("  ").await.is_err());
    }

    #[test]
    fn test_missing_base_url_rejected() {
        let err = create(&ConnectorConfig::new(), &ConnectorContext::new()).err().unwrap();
        assert!(err.to_string().contains("base_url"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut connector = connector_for("http://localhost:1");
        connector.connect().await.unwrap();
        connector.close().await;
        connector.close().await;
    }
}
