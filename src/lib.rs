//! # Voice Turn Backend
//!
//! A spoken dialogue turn loop: an utterance arrives over a WebSocket, is
//! transcribed, answered by a streaming language model, synthesized sentence by
//! sentence, and played back on the client in the order it was produced.
//!
//! ## Application Architecture:
//! - **audio**: WAV encoding/decoding and container sniffing
//! - **protocol**: the JSON/binary message set on the socket
//! - **pipeline**: session state machine, sentence segmenter, ordered synthesis
//! - **providers**: transcription/completion/synthesis contracts and the HTTP client
//! - **websocket**: the actix actor bridging a socket to a session
//! - **client**: playback queue, transcript and connection for the CLI client
//! - **config**, **state**, **error**, **health**, **handlers**: the server shell

pub mod audio; // WAV codec (audio/ directory)
pub mod client; // Client-side playback (client/ directory)
pub mod config; // Configuration management (config.rs)
pub mod error; // Error handling types (error.rs)
pub mod handlers; // HTTP request handlers (handlers/ directory)
pub mod health; // Health check endpoints (health.rs)
pub mod pipeline; // Turn pipeline (pipeline/ directory)
pub mod protocol; // Wire protocol (protocol.rs)
pub mod providers; // Provider contracts and clients (providers/ directory)
pub mod state; // Application state management (state.rs)
pub mod websocket; // Voice WebSocket actor (websocket.rs)
