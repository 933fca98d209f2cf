//! # Audio Module
//!
//! Container-level audio handling shared by the server and the client.
//!
//! ## Key Components:
//! - **Codec**: canonical mono PCM16 WAV encode/decode for uploaded utterances
//! - **Sniffing**: picks a playback media type for synthesized speech chunks
//!
//! Sample data is never transcoded beyond WAV/PCM; synthesized audio is passed
//! through as opaque bytes.

pub mod codec; // WAV encoding, decoding and container sniffing

pub use codec::{classify, decode_pcm16_wav, encode_wav, AudioContainer, DecodedWav};
