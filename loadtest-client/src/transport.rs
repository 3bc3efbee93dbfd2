//! HTTP transport seam.
//!
//! Every platform client talks through [`HttpTransport`] so that the same
//! session logic runs against a real deployment or an in-memory platform.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use loadtest_core::{
    DataError, ExpectedStatus, LoadTestError, LoadTestResult, ProtocolError, TransportError,
};

use crate::options::ClientOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Bytes { content_type: String, data: Vec<u8> },
}

/// A request relative to the platform base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Stable name used for logging and per-request metrics.
    pub name: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Whether the transport may resend the request after a transport error.
    pub retryable: bool,
}

impl HttpRequest {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: RequestBody::Empty,
            retryable: method == Method::Get,
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        };
        self
    }

    /// Marks a GET as unsafe to resend, e.g. a single-use token exchange.
    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Last value of a header, case-insensitive.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Fails with a [`ProtocolError`] unless the status is expected.
    pub fn expect(self, operation: &str, expected: &ExpectedStatus) -> LoadTestResult<Self> {
        if expected.accepts(self.status) {
            Ok(self)
        } else {
            Err(ProtocolError::new(operation, expected.clone(), self.status, &self.body).into())
        }
    }

    /// Parses the body; a malformed or mismatching body is a data error.
    pub fn json<T: DeserializeOwned>(&self, operation: &str) -> LoadTestResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            LoadTestError::Data(DataError::new(operation, format!("well-formed JSON body: {}", e)))
        })
    }
}

/// Trait for executing platform requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> LoadTestResult<HttpResponse>;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn HttpTransport>;

/// [`HttpTransport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    options: ClientOptions,
}

impl ReqwestTransport {
    pub fn new(options: ClientOptions) -> LoadTestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| LoadTestError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, options })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), path)
    }

    async fn send_once(&self, request: &HttpRequest) -> LoadTestResult<HttpResponse> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Bytes { content_type, data } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let transport_error = |e: reqwest::Error| -> LoadTestError {
            if e.is_timeout() {
                TransportError::timeout(&request.name, e.to_string()).into()
            } else {
                TransportError::new(&request.name, e.to_string()).into()
            }
        };
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> LoadTestResult<HttpResponse> {
        let attempts = if request.retryable {
            self.options.retry.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 1;
        loop {
            match self.send_once(&request).await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.options.retry.backoff(attempt);
                    tracing::warn!(request = %request.name, attempt, ?delay, error = %err, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => {
                    if let Ok(response) = &result {
                        tracing::debug!(
                            request = %request.name,
                            method = %request.method,
                            path = %request.path,
                            status = response.status,
                            "request completed"
                        );
                    }
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_gets_are_retryable_by_default() {
        assert!(HttpRequest::get("Get", "/x").retryable);
        assert!(!HttpRequest::post("Post", "/x").retryable);
        assert!(!HttpRequest::get("Get", "/x").not_retryable().retryable);
    }

    #[test]
    fn request_accessors() {
        let request = HttpRequest::post("Token", "/oauth/token")
            .header("Authorization", "Basic abc")
            .query("a", "1")
            .form(&[("grant_type", "password")]);
        assert_eq!(request.header_value("authorization"), Some("Basic abc"));
        assert_eq!(request.query_value("a"), Some("1"));
        assert_eq!(request.form_value("grant_type"), Some("password"));
    }

    #[test]
    fn unexpected_status_is_a_protocol_error() {
        let err = HttpResponse::new(500, "boom")
            .expect("Create project", &ExpectedStatus::one(201))
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
