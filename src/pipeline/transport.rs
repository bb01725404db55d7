use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::settings::BackendConfig;
use crate::pipeline::request::{ApiRequest, ApiResponse, RequestBody};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network failure: {0}")]
    Network(String),
}

/// Sends a fully prepared request. Any HTTP status is a response; only
/// failures to obtain one are errors.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            default_headers: HeaderMap::new(),
            timeout: None,
        }
    }

    pub fn from_config(client: Client, backend: &BackendConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &backend.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| anyhow!("invalid header name '{}': {}", name, err))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| anyhow!("invalid value for header '{}': {}", name, err))?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            default_headers,
            timeout: backend.timeout_ms.map(Duration::from_millis),
            ..Self::new(client, backend.base_url.as_str())
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let mut headers = self.default_headers.clone();
        headers.extend(request.headers);

        let mut builder = self.client.request(request.method, &url).headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder.body(text),
            None => builder,
        };

        let response = builder.send().await.map_err(|err| {
            if err.is_builder() {
                TransportError::InvalidRequest(err.to_string())
            } else {
                TransportError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
