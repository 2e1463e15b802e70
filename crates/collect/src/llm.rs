use crate::error::CollectError;
use crate::json::{extract_json, parse_candidates};
use crate::Collector;
use async_trait::async_trait;
use listings::{RawCandidate, SearchScope};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Collector backed by an Ollama-style `/api/generate` endpoint. The prompt
/// is supplied by the caller; the reply is expected to contain a JSON list
/// of roles somewhere in its text.
#[derive(Clone)]
pub struct LlmCollector {
    label: String,
    scope: SearchScope,
    base_url: String,
    model: String,
    prompt: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmCollector {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            scope: SearchScope::Broad,
            base_url: base_url.into(),
            model: model.into(),
            prompt: prompt.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Per-request timeout on the underlying HTTP client.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, CollectError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    async fn generate(&self) -> Result<String, CollectError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let request = GenerateRequest {
            model: &self.model,
            prompt: &self.prompt,
            stream: false,
            format: "json",
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let reply: GenerateResponse = response.json().await?;
        Ok(reply.response)
    }
}

/// Unparseable model output yields an empty batch rather than an error.
pub fn candidates_from_reply(label: &str, text: &str) -> Vec<RawCandidate> {
    let Some(value) = extract_json(text) else {
        let preview: String = text.chars().take(200).collect();
        warn!(collector = label, preview = %preview, "Could not parse JSON from model reply");
        return Vec::new();
    };

    let batch = parse_candidates(value);
    if batch.skipped > 0 {
        warn!(collector = label, skipped = batch.skipped, "Skipped malformed entries");
    }
    batch.candidates
}

#[async_trait]
impl Collector for LlmCollector {
    fn label(&self) -> &str {
        &self.label
    }

    fn scope(&self) -> SearchScope {
        self.scope
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>, CollectError> {
        info!(collector = %self.label, model = %self.model, "Requesting candidates from model");
        let text = self.generate().await?;
        let candidates = candidates_from_reply(&self.label, &text);
        info!(collector = %self.label, found = candidates.len(), "Model reply parsed");
        Ok(candidates)
    }
}
