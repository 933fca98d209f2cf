//! # OpenAI-Compatible Provider Client
//!
//! Implements all three provider contracts against an OpenAI-style REST API
//! (OpenAI itself, or any self-hosted server exposing the same routes).
//!
//! ## Endpoints:
//! - `POST {base_url}/audio/transcriptions`: multipart upload of the utterance
//! - `POST {base_url}/chat/completions`: `stream: true`, server-sent events
//! - `POST {base_url}/audio/speech`: JSON request, encoded audio response

use crate::config::ProvidersConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ConversationTurn;
use crate::providers::sse::SseDecoder;
use crate::providers::{ChatCompleter, DeltaStream, SpeechSynthesizer, Transcriber};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// HTTP client for an OpenAI-compatible API.
pub struct OpenAiClient {
    http: Client,
    config: ProvidersConfig,
}

impl OpenAiClient {
    pub fn new(config: ProvidersConfig) -> PipelineResult<Self> {
        let mut headers = header::HeaderMap::new();
        if !config.api_key.trim().is_empty() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
                .map_err(|e| PipelineError::Provider(format!("invalid API key header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::Provider(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Turn non-2xx responses into a readable error string.
async fn check_status(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(format!("HTTP {}: {}", status, body.trim()))
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, wav: Vec<u8>) -> PipelineResult<Option<String>> {
        let audio_part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::Transcription(format!("bad audio part: {}", e)))?;
        let form = Form::new()
            .part("file", audio_part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(e.to_string()))?;
        let response = check_status(response)
            .await
            .map_err(PipelineError::Transcription)?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Transcription(format!("unreadable response: {}", e)))?;

        let text = body.text.trim();
        debug!(chars = text.len(), "Transcription response received");
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

#[async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete_chat(&self, turns: Vec<ConversationTurn>) -> PipelineResult<DeltaStream> {
        let body = json!({
            "model": self.config.chat_model,
            "messages": turns,
            "stream": true,
        });

        let response = self
            .http
            .post(self.url("chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Completion(e.to_string()))?;
        let response = check_status(response)
            .await
            .map_err(PipelineError::Completion)?;

        let mut decoder = SseDecoder::new();
        let deltas = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => Err(PipelineError::Completion(format!("stream interrupted: {}", e))),
            })
            .flat_map(|batch| {
                let items: Vec<PipelineResult<String>> = match batch {
                    Ok(deltas) => deltas.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            });

        Ok(deltas.boxed())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: String) -> PipelineResult<Option<Vec<u8>>> {
        let body = json!({
            "model": self.config.speech_model,
            "input": text,
            "voice": self.config.voice,
            "response_format": self.config.speech_format,
        });

        let response = self
            .http
            .post(self.url("audio/speech"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        let response = check_status(response)
            .await
            .map_err(PipelineError::Synthesis)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Synthesis(format!("unreadable audio body: {}", e)))?;

        if bytes.is_empty() {
            warn!("Speech endpoint returned an empty body");
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_url_joining() {
        let mut config = AppConfig::default().providers;
        config.base_url = "http://localhost:8000/v1/".to_string();
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.url("chat/completions"), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_rejects_unprintable_key() {
        let mut config = AppConfig::default().providers;
        config.api_key = "bad\nkey".to_string();
        assert!(OpenAiClient::new(config).is_err());
    }
}
