/// Outbound gateway used by api_call steps
///
/// The engine hands the gateway a fully-resolved request and gets back
/// `{status, headers, data}`. Any HTTP status is a normal response; only
/// transport and decode problems are errors.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Request handed to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    /// Absolute URL or a path relative to the gateway base
    pub url: String,
    pub method: String,
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
}

/// Response from the gateway, whatever the status code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
}

impl GatewayResponse {
    pub fn into_output(self) -> Value {
        serde_json::json!({
            "status": self.status,
            "headers": self.headers,
            "data": self.data,
        })
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Decode(String),
}

/// Anything that can carry an outbound request
#[async_trait]
pub trait OutboundGateway: Send + Sync {
    async fn request(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// reqwest-backed gateway
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Absolute URLs pass through; relative ones are joined onto the base
    pub fn full_url(&self, url: &str) -> String {
        if is_absolute(url) {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[async_trait]
impl OutboundGateway for HttpGateway {
    async fn request(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let url = self.full_url(&request.url);
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| GatewayError::Transport(format!("Unsupported HTTP method: {}", request.method)))?;

        tracing::debug!("🌍 Gateway request: {} {}", method, url);

        let mut builder = self.client.request(method.clone(), &url);
        for (key, value) in &request.headers {
            match value {
                Value::String(text) => builder = builder.header(key.as_str(), text.as_str()),
                Value::Null => {}
                other => builder = builder.header(key.as_str(), other.to_string()),
            }
        }
        if let Some(body) = &request.body {
            builder = match body {
                Value::String(text) => builder.body(text.clone()),
                other => builder.json(other),
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {}", e)))?;

        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| GatewayError::Decode(format!("Response body is not valid JSON: {}", e)))?
        };

        tracing::debug!("📡 Gateway response: {} {} -> {}", method, url, status);

        Ok(GatewayResponse { status, headers, data })
    }
}
