//! # Voice Client
//!
//! The receiving half of the turn loop: a connection that reads server
//! messages, a transcript of the conversation, and a playback queue that plays
//! synthesized sentences one at a time in arrival order.

pub mod connection; // WebSocket client feeding the queue and transcript
pub mod playback; // Single-flight playback queue
pub mod player; // External-program audio output
pub mod transcript; // User/assistant transcript entries

pub use connection::VoiceConnection;
pub use playback::{AudioOutput, AudioQueueItem, PlaybackQueue};
pub use player::CommandPlayer;
pub use transcript::{Speaker, Transcript, TranscriptEntry};
