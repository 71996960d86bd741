//! HTTP transport: the only path to the network.
//!
//! [`Transport`] reads the active credential from a [`CredentialHandle`] at
//! call time, encodes the body, and folds every non-2xx response into a
//! [`TransportError`] that carries the server's `detail` when one was sent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::credentials::{Credential, CredentialHandle};

/// Normalized failure surface of every outbound call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("server returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Text suitable for direct display. Prefers the server's detail.
    pub fn display_message(&self) -> String {
        match self {
            TransportError::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            TransportError::Status { status: 401, .. } => {
                "Your session is no longer valid. Please log in again.".to_string()
            }
            TransportError::Status { status, .. } => format!("Request failed ({})", status),
            TransportError::Timeout => "The server took too long to respond".to_string(),
            TransportError::Network(_) => "Could not reach the server".to_string(),
            TransportError::Decode(_) => "Unexpected response from the server".to_string(),
            TransportError::Client(_) => "HTTP client could not be initialized".to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body encodings used by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded`, used only by login.
    Form(Vec<(String, String)>),
}

impl Body {
    /// JSON body from any serializable value; `null` becomes [`Body::Empty`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, TransportError> {
        let value = serde_json::to_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(match value {
            Value::Null => Body::Empty,
            value => Body::Json(value),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub request_id: String,
    pub method: Method,
    /// Path relative to the API base, including any query string.
    pub path: String,
    pub bearer: Option<Credential>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for raw HTTP execution, allows swapping the network out in tests
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default backend using reqwest
pub struct ReqwestBackend {
    client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(credential) = &request.bearer {
            builder = builder.bearer_auth(credential.as_str());
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Pull a human-readable message out of a FastAPI-style error body.
///
/// `detail` is either a string or a list of validation objects with `msg`.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

/// Credential-injecting request sender shared by every higher component.
#[derive(Clone)]
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    credentials: CredentialHandle,
}

impl Transport {
    pub fn new(backend: Arc<dyn HttpBackend>, credentials: CredentialHandle) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialHandle {
        &self.credentials
    }

    /// Send a request and return the decoded JSON body (`null` when empty).
    pub async fn send(&self, method: Method, path: &str, body: Body) -> Result<Value, TransportError> {
        let bearer = self.credentials.current();
        let request = HttpRequest {
            request_id: Uuid::new_v4().to_string(),
            method,
            path: path.to_string(),
            bearer,
            body,
        };
        let request_id = request.request_id.clone();

        debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            authenticated = request.bearer.is_some(),
            "sending request"
        );

        let response = match self.backend.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(request_id = %request_id, method = %method, path = %path, error = %e, "request failed");
                return Err(e);
            }
        };

        if !response.is_success() {
            let detail = extract_detail(&response.body);
            warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status,
                detail = detail.as_deref().unwrap_or(""),
                "request rejected"
            );
            return Err(TransportError::Status {
                status: response.status,
                detail,
            });
        }

        debug!(request_id = %request_id, status = response.status, "response received");

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let value = self.send(Method::Get, path, Body::Empty).await?;
        decode(value)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.send(Method::Post, path, Body::json(body)?).await?;
        decode(value)
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<T, TransportError> {
        let value = self.send(Method::Post, path, Body::Form(fields)).await?;
        decode(value)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.send(Method::Put, path, Body::json(body)?).await?;
        decode(value)
    }

    pub async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.send(Method::Delete, path, Body::Empty).await?;
        Ok(())
    }
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}
