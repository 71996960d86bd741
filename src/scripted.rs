//! In-memory [`HttpBackend`] that replays scripted responses per route.
//!
//! Used by the integration tests and for offline runs of the client. Routes
//! are matched on method + path with the query string stripped. When a
//! route's queue is down to its last response, that response is repeated.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::transport::{Body, HttpBackend, HttpRequest, HttpResponse, Method, TransportError};

/// A request as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Body,
}

#[derive(Default)]
pub struct ScriptedBackend {
    routes: Mutex<HashMap<(Method, String), VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a JSON response for a route.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Ok(HttpResponse::json(status, body)))
    }

    /// Queue an empty-bodied response for a route.
    pub fn respond_empty(&self, method: Method, path: &str, status: u16) -> &Self {
        self.push(method, path, Ok(HttpResponse::new(status, "")))
    }

    /// Queue a transport-level failure for a route.
    pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.push(method, path, Err(error))
    }

    fn push(&self, method: Method, path: &str, outcome: Result<HttpResponse, TransportError>) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((method, route_key(path)))
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls made to a route (query string ignored).
    pub fn calls(&self, method: Method, path: &str) -> usize {
        let key = route_key(path);
        self.requests()
            .iter()
            .filter(|r| r.method == method && route_key(&r.path) == key)
            .count()
    }

    fn next_outcome(&self, method: Method, path: &str) -> Result<HttpResponse, TransportError> {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = routes.get_mut(&(method, route_key(path))) else {
            return Ok(HttpResponse::json(404, serde_json::json!({"detail": "Not Found"})));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Err(TransportError::Network("empty script".into())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Network("empty script".into())))
        }
    }
}

fn route_key(path: &str) -> String {
    path.split('?').next().unwrap_or(path).to_string()
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                method: request.method,
                path: request.path.clone(),
                bearer: request.bearer.as_ref().map(|c| c.as_str().to_string()),
                body: request.body.clone(),
            });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.next_outcome(request.method, &request.path)
    }
}
