//! # Error Handling
//!
//! Two error families live here:
//!
//! - **AppError**: failures of the HTTP surface (config endpoints, session
//!   admission). Converted into JSON HTTP responses via `ResponseError`.
//! - **PipelineError**: failures inside a voice session (transcription,
//!   completion, synthesis, malformed client frames). These never end a session;
//!   the controller turns them into `{"type":"error"}` wire messages.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - BadRequest/ValidationError → 400
/// - Unavailable → 503 (session limit reached)
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or malformed data
    BadRequest(String),

    /// User input failed validation rules
    ValidationError(String),

    /// The server cannot take another voice session right now
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Server port cannot be 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// JSON parsing failures are almost always the client's fault, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Failures raised inside a voice session.
///
/// ## Error Categories:
/// - **Transcription**: the speech-to-text call raised
/// - **Completion**: the chat completion failed to start or broke mid-stream
/// - **Synthesis**: a text-to-speech call failed (dropped per unit, never fatal)
/// - **Protocol**: the client sent a frame we could not interpret
/// - **Provider**: a provider could not be built or reached at all
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Transcription(String),
    Completion(String),
    Synthesis(String),
    Protocol(String),
    Provider(String),
}

impl PipelineError {
    /// Short machine-readable category, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transcription(_) => "transcription",
            PipelineError::Completion(_) => "completion",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::Protocol(_) => "protocol",
            PipelineError::Provider(_) => "provider",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Transcription(msg) => write!(f, "Transcription failed: {}", msg),
            PipelineError::Completion(msg) => write!(f, "Completion failed: {}", msg),
            PipelineError::Synthesis(msg) => write!(f, "Speech synthesis failed: {}", msg),
            PipelineError::Protocol(msg) => write!(f, "Invalid message: {}", msg),
            PipelineError::Provider(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Shorthand for provider and pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;
