//! # Speech and Language Providers
//!
//! Capability contracts consumed by a voice session, plus the OpenAI-compatible
//! HTTP implementation used in production.
//!
//! ## Contracts:
//! - **Transcriber**: WAV bytes → transcript (or `None` when nothing was said)
//! - **ChatCompleter**: conversation turns → ordered stream of text deltas
//! - **SpeechSynthesizer**: sentence text → encoded audio (or `None`)
//!
//! Sessions only ever see `Arc<dyn ...>` handles, so tests swap in scripted
//! implementations without touching the pipeline.

pub mod openai; // OpenAI-compatible HTTP client
pub mod sse; // Server-sent event parsing for streamed completions

use crate::error::PipelineResult;
use crate::pipeline::ConversationTurn;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// An ordered stream of completion text deltas. May fail mid-stream.
pub type DeltaStream = BoxStream<'static, PipelineResult<String>>;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns `Ok(None)` when the audio contained no recognizable speech.
    async fn transcribe(&self, wav: Vec<u8>) -> PipelineResult<Option<String>>;
}

#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete_chat(&self, turns: Vec<ConversationTurn>) -> PipelineResult<DeltaStream>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns `Ok(None)` when the provider produced no usable audio.
    async fn synthesize(&self, text: String) -> PipelineResult<Option<Vec<u8>>>;
}

/// The three collaborators a session needs, shared across sessions.
#[derive(Clone)]
pub struct Providers {
    pub transcriber: Arc<dyn Transcriber>,
    pub completer: Arc<dyn ChatCompleter>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Providers {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn ChatCompleter>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            completer,
            synthesizer,
        }
    }

    /// Use one OpenAI-compatible client for all three capabilities.
    pub fn openai(client: openai::OpenAiClient) -> Self {
        let client = Arc::new(client);
        Self {
            transcriber: client.clone(),
            completer: client.clone(),
            synthesizer: client,
        }
    }
}
