use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::common::error::Result;
use crate::pipeline::storage::{RunKey, StoredRun};

/// A fully shaped outbound request. Source clients build these; the HTTP
/// port only executes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Time source for backoff and rate-limit waits; tests substitute one that
/// records requested delays and returns immediately.
#[async_trait]
pub trait DelayPort: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Persistence sink and pull source for completed runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Replace whatever is stored under the run's key.
    async fn save_run(&self, run: &StoredRun) -> Result<()>;
    async fn load_latest(&self, key: &RunKey) -> Result<Option<StoredRun>>;
}
