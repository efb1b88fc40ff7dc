use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::TranscriptionResult;
use crate::{ExtractError, Result};

/// Speech-to-text backend seam. Production talks to the Whisper HTTP
/// endpoint; tests substitute fakes.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a single audio file that fits the upload size limit.
    async fn transcribe_file(
        &self,
        path: &Path,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionResult>;
}

/// Whisper API client: one multipart POST per audio blob.
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    duration: Option<f64>,
    language: Option<String>,
}

impl WhisperClient {
    pub fn new(client: reqwest::Client, api_key: String, endpoint: String) -> Self {
        Self {
            client,
            api_key,
            endpoint,
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe_file(
        &self,
        path: &Path,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionResult> {
        tracing::debug!("Uploading {} for transcription", path.display());

        let bytes = tokio::fs::read(path).await?;
        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", model.to_string())
            .text("language", language.to_string())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractError::TranscriptionUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::TranscriptionUnavailable(format!(
                "Speech-to-text endpoint returned {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::TranscriptionUnavailable(e.to_string()))?;

        Ok(TranscriptionResult {
            text: parsed.text,
            duration_seconds: parsed.duration,
            language: parsed.language,
        })
    }
}
