//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (`config.toml`)
//! - Environment variables (with `APP_` prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (`HOST`, `PORT`, `OPENAI_API_KEY`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PIPELINE__SYNTHESIS_PARALLELISM`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (the `Default` impl)
//!
//! ## Sections:
//! - **server**: where the HTTP/WebSocket listener binds
//! - **providers**: the OpenAI-compatible endpoint and models used for
//!   transcription, chat completion and speech synthesis
//! - **pipeline**: sentence segmentation and synthesis dispatch tuning
//! - **performance**: session admission limits

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub pipeline: PipelineConfig,
    pub performance: PerformanceConfig,
}

/// Listener settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: local development
/// - `host = "0.0.0.0"`: accept connections from any interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech and language model provider settings.
///
/// All three capabilities talk to one OpenAI-compatible API. `api_key` is
/// never serialized back out through the config endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: String,
    /// Container requested from the speech endpoint ("wav" or "mp3")
    pub speech_format: String,
    /// Per-request timeout for provider HTTP calls
    pub request_timeout_secs: u64,
}

/// Pipeline tuning.
///
/// ## Fields:
/// - `system_prompt`: prepended to every completion request, never stored in history
/// - `max_sentence_chars`: flush threshold when no sentence terminator shows up
/// - `synthesis_parallelism`: speech calls allowed in flight at once; results are
///   still released strictly in order (1 = single in-order slot)
/// - `synthesis_timeout_secs`: a unit whose synthesis takes longer is dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub system_prompt: String,
    pub max_sentence_chars: usize,
    pub synthesis_parallelism: usize,
    pub synthesis_timeout_secs: u64,
}

/// Session admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    /// Seconds without a pong before a WebSocket is considered dead
    pub client_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            providers: ProvidersConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                transcription_model: "whisper-1".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
                speech_model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                speech_format: "mp3".to_string(),
                request_timeout_secs: 60,
            },
            pipeline: PipelineConfig {
                system_prompt: "You are a helpful voice assistant. Keep answers short and conversational."
                    .to_string(),
                max_sentence_chars: 200,
                synthesis_parallelism: 1,
                synthesis_timeout_secs: 30,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
                client_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`
    /// - `APP_PROVIDERS__CHAT_MODEL=gpt-4o`
    /// - `PORT=3000`, `HOST=0.0.0.0`: deployment platform conventions
    /// - `OPENAI_API_KEY=sk-...`: provider key without the APP_ prefix
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("providers.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.providers.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Provider base_url cannot be empty"));
        }

        if !matches!(self.providers.speech_format.as_str(), "wav" | "mp3") {
            return Err(anyhow::anyhow!(
                "Unsupported speech_format '{}' (expected wav or mp3)",
                self.providers.speech_format
            ));
        }

        if self.pipeline.max_sentence_chars == 0 {
            return Err(anyhow::anyhow!("max_sentence_chars must be greater than 0"));
        }

        if self.pipeline.synthesis_parallelism == 0 {
            return Err(anyhow::anyhow!("synthesis_parallelism must be greater than 0"));
        }

        if self.pipeline.synthesis_timeout_secs == 0 {
            return Err(anyhow::anyhow!("synthesis_timeout_secs must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Apply a partial JSON update (used by `PUT /api/v1/config`).
    ///
    /// Only fields present in the JSON are changed; the result is validated.
    /// Sending `{"pipeline": {"synthesis_parallelism": 3}}` changes just that value.
    /// Listener and provider settings are read once at startup and cannot be
    /// changed here.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if partial.get("providers").is_some() {
            return Err(anyhow::anyhow!(
                "Provider settings are fixed at startup; restart the server to change them"
            ));
        }

        if let Some(pipeline) = partial.get("pipeline") {
            if let Some(v) = pipeline.get("system_prompt").and_then(|v| v.as_str()) {
                self.pipeline.system_prompt = v.to_string();
            }
            if let Some(v) = pipeline.get("max_sentence_chars").and_then(|v| v.as_u64()) {
                self.pipeline.max_sentence_chars = v as usize;
            }
            if let Some(v) = pipeline.get("synthesis_parallelism").and_then(|v| v.as_u64()) {
                self.pipeline.synthesis_parallelism = v as usize;
            }
            if let Some(v) = pipeline.get("synthesis_timeout_secs").and_then(|v| v.as_u64()) {
                self.pipeline.synthesis_timeout_secs = v;
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(v) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = v as usize;
            }
            if let Some(v) = performance.get("client_timeout_secs").and_then(|v| v.as_u64()) {
                self.performance.client_timeout_secs = v;
            }
        }

        self.validate()?;
        Ok(())
    }

    /// Whether a provider key has been configured.
    pub fn has_api_key(&self) -> bool {
        !self.providers.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.synthesis_parallelism, 1);
        assert!(config.validate().is_ok());
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.synthesis_parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.providers.speech_format = "ogg".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"synthesis_parallelism": 3}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.pipeline.synthesis_parallelism, 3);
        assert_eq!(config.pipeline.max_sentence_chars, 200);
    }

    #[test]
    fn test_config_update_rejects_provider_settings() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"synthesis_parallelism": 3}, "providers": {"voice": "nova"}}"#;
        assert!(config.update_from_json(json).is_err());
        assert_eq!(config.providers.voice, "alloy");
        assert_eq!(config.pipeline.synthesis_parallelism, 1);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"max_sentence_chars": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
