//! # Wire Protocol
//!
//! The message set exchanged over one voice WebSocket.
//!
//! ## Server → Client (JSON text frames):
//! - `{"type":"status","text":"ready"}` and the other session statuses
//! - `{"type":"text","text":"..."}`: the user's transcribed utterance
//! - `{"type":"audio","text":"...","audio":"<base64>"}`: one synthesized sentence
//! - `{"type":"error","text":"..."}`
//!
//! ## Client → Server:
//! - **Binary frame**: one WAV-encoded utterance
//! - `{"type":"cmd","data":"clear"}`: drop the conversation history
//! - `{"type":"cmd","data":"listen"}`: the client started capturing audio

use crate::error::PipelineError;
use crate::pipeline::SpeechChunk;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const STATUS_READY: &str = "ready";
pub const STATUS_LISTENING: &str = "Listening...";
pub const STATUS_PROCESSING: &str = "Processing....";
pub const STATUS_SPEAKING: &str = "Speaking...";
pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_CLEARED: &str = "Conversation cleared";

/// Messages sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Status { text: String },
    Text { text: String },
    Audio { text: String, audio: String },
    Error { text: String },
}

impl ServerMessage {
    pub fn status(text: impl Into<String>) -> Self {
        ServerMessage::Status { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ServerMessage::Text { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ServerMessage::Error { text: text.into() }
    }

    /// Wrap a synthesized chunk, base64-encoding its audio.
    pub fn audio(chunk: &SpeechChunk) -> Self {
        ServerMessage::Audio {
            text: chunk.text.clone(),
            audio: STANDARD.encode(&chunk.audio),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain string variants cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Commands a client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Clear,
    Listen,
}

/// JSON messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Cmd { data: Command },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text).map_err(|e| PipelineError::Protocol(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Decode the base64 payload of an audio message.
pub fn decode_audio(audio: &str) -> Result<Vec<u8>, PipelineError> {
    STANDARD
        .decode(audio)
        .map_err(|e| PipelineError::Protocol(format!("audio payload is not base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_shapes() {
        let json = ServerMessage::status(STATUS_PROCESSING).to_json();
        assert_eq!(json, r#"{"type":"status","text":"Processing...."}"#);

        let json = ServerMessage::error("boom").to_json();
        assert_eq!(json, r#"{"type":"error","text":"boom"}"#);
    }

    #[test]
    fn test_audio_message_base64() {
        let chunk = SpeechChunk {
            sequence: 0,
            text: "Hi.".to_string(),
            audio: vec![1, 2, 3, 250],
        };
        let msg = ServerMessage::audio(&chunk);
        let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "audio");
        assert_eq!(value["text"], "Hi.");

        let ServerMessage::Audio { audio, .. } = msg else {
            panic!("expected audio message");
        };
        assert_eq!(decode_audio(&audio).unwrap(), vec![1, 2, 3, 250]);
    }

    #[test]
    fn test_client_commands() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"cmd","data":"clear"}"#).unwrap(),
            ClientMessage::Cmd { data: Command::Clear }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"cmd","data":"listen"}"#).unwrap(),
            ClientMessage::Cmd { data: Command::Listen }
        );
        assert!(ClientMessage::parse(r#"{"type":"cmd","data":"reboot"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }
}
