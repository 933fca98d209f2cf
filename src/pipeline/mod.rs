//! # Turn Pipeline
//!
//! Everything that happens between an utterance arriving and its spoken reply
//! leaving: the per-connection state machine, sentence segmentation of the
//! streamed reply, and ordered speech synthesis.
//!
//! ## Flow:
//! ```text
//! audio ─► transcribe ─► complete_chat ─► SentenceSegmenter ─► SynthesisDispatcher ─► audio messages
//! ```

pub mod dispatcher; // Ordered speech synthesis
pub mod segmenter; // Streamed text → sentence units
pub mod session; // Per-connection state machine

pub use dispatcher::SynthesisDispatcher;
pub use segmenter::SentenceSegmenter;
pub use session::{SessionController, SessionHandle, SessionInput, SessionState};

use serde::{Deserialize, Serialize};

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a session's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A flushed segment of a reply, numbered from 0 within its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    pub sequence: u64,
    pub text: String,
}

/// Synthesized audio for one sentence unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechChunk {
    pub sequence: u64,
    pub text: String,
    pub audio: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serializes_for_chat_requests() {
        let json = serde_json::to_string(&ConversationTurn::assistant("Hi.")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Hi."}"#);
    }
}
