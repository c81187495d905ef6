//! HTTP transport to the AlpyneServer.
//!
//! Thin JSON-over-HTTP wrapper: query parameters are flattened the way the
//! server's endpoints read them, connection failures are retried while the
//! server is still booting, and any status >= 400 becomes a [`ModelError`].

use std::time::Duration;

use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ModelError, RetryConfig};

/// Status code and decoded body (None when the body is empty).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Option<Value>,
}

#[derive(Clone)]
pub struct HttpClient {
    root_url: String,
    client: Client,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpClient {
    pub fn new(root_url: impl Into<String>, timeout: Duration) -> Self {
        let mut root_url = root_url.into();
        while root_url.ends_with('/') {
            root_url.pop();
        }
        Self {
            root_url,
            client: Client::new(),
            timeout,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Build the full URL for `path`, appending `params` to any existing query.
    ///
    /// Lists repeat the key once per element, booleans and objects are sent
    /// as JSON, strings are sent bare.
    pub fn build_url(&self, path: &str, params: Option<&Map<String, Value>>) -> Result<Url, ModelError> {
        let raw = format!("{}{}", self.root_url, path);
        let mut url =
            Url::parse(&raw).map_err(|e| ModelError::parse(format!("Invalid URL {}: {}", raw, e)))?;
        if let Some(params) = params {
            let pairs = query_pairs(params);
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs);
            }
        }
        Ok(url)
    }

    /// Timeout for a request; lock requests carry their own (in ms) and get twice that.
    fn timeout_for(&self, params: Option<&Map<String, Value>>) -> Duration {
        params
            .and_then(|p| p.get("timeout"))
            .and_then(|v| v.as_u64())
            .map(|ms| Duration::from_millis(ms.saturating_mul(2)))
            .unwrap_or(self.timeout)
    }

    /// Execute a request, retrying connection failures.
    pub async fn api_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: Option<&Map<String, Value>>,
        body: Option<&B>,
    ) -> Result<HttpResponse, ModelError> {
        let url = self.build_url(path, params)?;
        let timeout = self.timeout_for(params);
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ModelError::parse(format!("Failed to encode request body: {}", e)))?;

        debug!(
            "{} {}: {}",
            method,
            url,
            payload
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default()
        );

        let mut attempt = 0;
        loop {
            match self.execute(&method, &url, timeout, payload.as_deref()).await {
                Ok(response) => return Ok(response),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    attempt += 1;
                    warn!(
                        "[ATTEMPT {} / {}] {}",
                        attempt, self.retry.max_retries, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(
        &self,
        method: &Method,
        url: &Url,
        timeout: Duration,
        payload: Option<&[u8]>,
    ) -> Result<HttpResponse, ModelError> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .timeout(timeout)
            .header("Content-Type", "application/json");
        if let Some(bytes) = payload {
            request = request.body(bytes.to_vec());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::timeout(url.as_str())
            } else {
                ModelError::network(format!("Request failed: {}", e), url.as_str())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ModelError::network(format!("Failed to read response: {}", e), url.as_str())
        })?;

        if status.as_u16() >= 400 {
            return Err(ModelError::http(status.as_u16(), text, url.as_str()));
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|e| {
                ModelError::parse(format!("Failed to parse response from {}: {}, body: {}", url, e, text))
            })?)
        };

        debug!("=> {} {:?}", status, body);

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn get(
        &self,
        path: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<HttpResponse, ModelError> {
        self.api_request::<Value>(Method::GET, path, params, None).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpResponse, ModelError> {
        self.api_request(Method::PUT, path, None, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpResponse, ModelError> {
        self.api_request(Method::PATCH, path, None, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, ModelError> {
        self.api_request::<Value>(Method::DELETE, path, None, None).await
    }
}

/// Flatten parameters into query pairs.
pub fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_to_query(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_to_query(other))),
        }
    }
    pairs
}

fn scalar_to_query(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
