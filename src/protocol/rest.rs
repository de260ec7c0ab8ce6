//! # REST Client
//!
//! HTTP admin API client for games that expose one instead of (or next to)
//! RCON. Requests carry JSON bodies and optional basic auth; every request is
//! bounded by the client timeout.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout::DEFAULT_TIMEOUT;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Successful REST exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestResponse {
    pub status: u16,
    pub url: String,
    pub method: String,
    /// Parsed JSON body, or `{"raw": text}` when the body is not JSON
    pub response: Value,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    host: String,
    port: u16,
    use_https: bool,
    credentials: Option<(String, String)>,
    timeout: Duration,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(host: impl Into<String>, port: u16, use_https: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_https,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub async fn get(&self, endpoint: &str) -> Result<RestResponse> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<RestResponse> {
        self.request(Method::POST, endpoint, body).await
    }

    pub async fn put(&self, endpoint: &str, body: Option<Value>) -> Result<RestResponse> {
        self.request(Method::PUT, endpoint, body).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<RestResponse> {
        self.request(Method::DELETE, endpoint, None).await
    }

    #[instrument(skip(self, body), fields(base = %self.base_url()))]
    async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<RestResponse> {
        let url = format!("{}{endpoint}", self.base_url());
        debug!(%method, %url, "REST request");

        let mut request = self.http.request(method.clone(), &url).timeout(self.timeout);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProtocolError::ConnectionTimeout(self.timeout)
            } else if e.is_connect() {
                ProtocolError::ConnectionError(format!("{method} {url}: {e}"))
            } else {
                ProtocolError::Http(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProtocolError::CommandError(format!(
                "HTTP {method} {url} failed with status {}: {text}",
                status.as_u16()
            )));
        }

        let parsed = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok(RestResponse {
            status: status.as_u16(),
            url,
            method: method.to_string(),
            response: parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(
            RestClient::new("example.com", 443, true).base_url(),
            "https://example.com:443"
        );
        assert_eq!(
            RestClient::new("127.0.0.1", 8212, false).base_url(),
            "http://127.0.0.1:8212"
        );
    }

    #[test]
    fn test_builder_options() {
        let client = RestClient::new("127.0.0.1", 8212, false)
            .with_basic_auth("admin", "secret")
            .with_timeout(Duration::from_secs(2));
        assert_eq!(
            client.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(client.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = RestClient::new("127.0.0.1", port, false).with_timeout(Duration::from_secs(2));
        let result = client.get("/v1/api/info").await;
        assert!(matches!(result, Err(ProtocolError::ConnectionError(_))));
    }
}
