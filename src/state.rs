//! # Application State Management
//!
//! State shared by every HTTP handler and every voice session.
//!
//! ## What lives here:
//! - **config**: the runtime configuration, readable by many, updatable via `PUT /api/v1/config`
//! - **metrics**: session and pipeline counters reported by the health endpoints
//! - **providers**: the transcription, completion and synthesis clients handed to each session
//!
//! ## Arc<RwLock<T>> Pattern
//! Handlers and sessions run concurrently on different worker threads, so
//! mutable data is wrapped in `Arc` (shared ownership) around `RwLock`
//! (many readers or one writer). Each session keeps its own conversation
//! history privately; nothing conversational is stored here.

use crate::config::AppConfig;
use crate::providers::Providers;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The application state shared across handlers and sessions.
///
/// Cloning is cheap: every field is either an `Arc` or `Copy`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Pipeline counters, updated by sessions and dispatchers
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Provider clients handed to each new session
    pub providers: Providers,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across all voice sessions.
///
/// ## Why these metrics matter:
/// - **active_sessions**: current open WebSockets (admission control)
/// - **sessions_rejected**: upgrades refused because the server was full
/// - **turns_completed**: assistant replies committed to a history
/// - **chunks_sent**: audio messages handed to the transport
/// - **synthesis_dropped**: sentences that produced no audio (error, timeout or empty)
/// - **pipeline_errors**: transcription/completion failures and malformed frames
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub active_sessions: u32,
    pub sessions_opened: u64,
    pub sessions_rejected: u64,
    pub turns_completed: u64,
    pub chunks_sent: u64,
    pub synthesis_dropped: u64,
    pub pipeline_errors: u64,
}

impl AppMetrics {
    /// Fraction of synthesized sentences that produced no audio.
    pub fn synthesis_drop_rate(&self) -> f64 {
        let attempted = self.chunks_sent + self.synthesis_dropped;
        if attempted > 0 {
            self.synthesis_dropped as f64 / attempted as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig, providers: Providers) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            providers,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Reserve a session slot; returns false when `max_concurrent_sessions` is reached.
    ///
    /// Check and increment happen under one write lock so two simultaneous
    /// upgrades cannot both take the last slot.
    pub fn try_open_session(&self, max_sessions: usize) -> bool {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions as usize >= max_sessions {
            metrics.sessions_rejected += 1;
            return false;
        }
        metrics.active_sessions += 1;
        metrics.sessions_opened += 1;
        true
    }

    /// Release a session slot. Guards against underflow.
    pub fn close_session(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    pub fn record_turn_completed(&self) {
        self.metrics.write().unwrap().turns_completed += 1;
    }

    pub fn record_chunk_sent(&self) {
        self.metrics.write().unwrap().chunks_sent += 1;
    }

    pub fn record_synthesis_dropped(&self) {
        self.metrics.write().unwrap().synthesis_dropped += 1;
    }

    pub fn record_pipeline_error(&self) {
        self.metrics.write().unwrap().pipeline_errors += 1;
    }

    /// Get a snapshot of current metrics (used by the health endpoints).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::PipelineResult;
    use crate::pipeline::ConversationTurn;
    use crate::providers::{ChatCompleter, DeltaStream, SpeechSynthesizer, Transcriber};
    use async_trait::async_trait;

    /// Providers that hear nothing and produce nothing.
    pub struct Silent;

    #[async_trait]
    impl Transcriber for Silent {
        async fn transcribe(&self, _wav: Vec<u8>) -> PipelineResult<Option<String>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl ChatCompleter for Silent {
        async fn complete_chat(&self, _turns: Vec<ConversationTurn>) -> PipelineResult<DeltaStream> {
            Err(crate::error::PipelineError::Completion("no model configured".to_string()))
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for Silent {
        async fn synthesize(&self, _text: String) -> PipelineResult<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    pub fn state() -> AppState {
        let providers = Providers::new(
            Arc::new(Silent),
            Arc::new(Silent),
            Arc::new(Silent),
        );
        AppState::new(AppConfig::default(), providers)
    }
}
