//! Incremental decoder for streamed chat completions.
//!
//! Completion endpoints answer with server-sent events: `data: {json}` lines
//! separated by blank lines, terminated by `data: [DONE]`. Network chunks split
//! lines (and UTF-8 sequences) arbitrarily, so bytes are buffered until a full
//! line is available.

use crate::error::PipelineError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the non-empty content deltas completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, PipelineError> {
        let mut deltas = Vec::new();
        if self.done {
            return Ok(deltas);
        }
        self.pending.extend_from_slice(bytes);

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                // Comments, event names and blank separators carry no content.
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                self.done = true;
                self.pending.clear();
                break;
            }

            let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
                PipelineError::Completion(format!("unreadable stream chunk: {}", e))
            })?;
            if let Some(content) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                if !content.is_empty() {
                    deltas.push(content);
                }
            }
        }

        Ok(deltas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_decodes_split_lines() {
        let stream = format!("{}{}data: [DONE]\n\n", event("Hello"), event(" there."));
        let bytes = stream.as_bytes();
        let mut decoder = SseDecoder::new();

        let mut deltas = Vec::new();
        for piece in bytes.chunks(7) {
            deltas.extend(decoder.push(piece).unwrap());
        }

        assert_eq!(deltas, vec!["Hello".to_string(), " there.".to_string()]);
        assert!(decoder.done);
    }

    #[test]
    fn test_skips_role_only_and_comment_lines() {
        let mut decoder = SseDecoder::new();
        let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n";
        let deltas = decoder.push(format!(": keep-alive\n{}", role).as_bytes()).unwrap();
        assert!(deltas.is_empty());
        assert!(!decoder.done);
    }

    #[test]
    fn test_multibyte_split() {
        let stream = event("héllo");
        let bytes = stream.as_bytes();
        let split = stream.find('é').unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(decoder.push(&bytes[split..]).unwrap(), vec!["héllo".to_string()]);
    }

    #[test]
    fn test_malformed_chunk_is_error() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {not json}\n").is_err());
    }
}
