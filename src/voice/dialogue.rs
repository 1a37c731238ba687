//! Reply generation client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Produces a reply for a transcript
#[async_trait]
pub trait DialogueClient: Send + Sync {
    /// Generate a reply with the given model
    ///
    /// # Errors
    ///
    /// Returns `Error::Dialogue` if the model call fails
    async fn reply(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) system: &'a str,
    pub(crate) stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub(crate) response: String,
}

/// Non-streaming client for an Ollama-compatible `/api/generate` endpoint
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::Config("dialogue URL required".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DialogueClient for OllamaClient {
    async fn reply(&self, model: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            system: "",
            stream: false,
        };

        tracing::debug!(model, prompt_len = prompt.len(), "requesting reply");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Dialogue(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dialogue(format!("model server error {status}: {body}")));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Dialogue(format!("invalid generate response: {e}")))?;

        tracing::info!(reply = %result.response, "received reply");
        Ok(result.response)
    }
}
