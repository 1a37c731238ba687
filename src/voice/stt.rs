//! Speech-to-text (STT) client

use std::time::Duration;

use async_trait::async_trait;

use super::pcm;
use crate::{Error, Result};

/// Converts utterance samples to text
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe normalized mono samples
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the service fails or answers with
    /// something other than a transcript
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

/// Response body of the transcription service
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    transcription: String,
}

/// Transcription over HTTP with a raw little-endian f32 request body
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriber {
    /// Create a client posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::Config("transcription URL required".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let body = pcm::f32_to_le_bytes(samples);
        tracing::debug!(audio_bytes = body.len(), url = %self.url, "starting transcription");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::Transcription(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;
        tracing::debug!(status = %status, body = %body, "server response");

        if !status.is_success() {
            return Err(Error::Transcription(format!(
                "transcription service error {status}: {body}"
            )));
        }

        let transcript = parse_transcription(&body)?;
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Extract the `transcription` field from a service response
///
/// # Errors
///
/// Returns `Error::Transcription` if the body is not a JSON object with a
/// string `transcription` field
pub fn parse_transcription(body: &str) -> Result<String> {
    serde_json::from_str::<TranscriptionResponse>(body)
        .map(|r| r.transcription)
        .map_err(|e| Error::Transcription(format!("transcription not found in response: {e}")))
}
