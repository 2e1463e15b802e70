use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("collector timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("no saved results for '{0}'")]
    NotFound(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CollectError {
    /// Rate limiting and timeouts are worth another attempt; everything
    /// else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectError::RateLimited(_) | CollectError::Timeout => true,
            CollectError::Http { status, .. } => *status == 429,
            CollectError::Request(e) => {
                e.is_timeout() || e.status().map(|s| s.as_u16()) == Some(429)
            }
            _ => false,
        }
    }
}
