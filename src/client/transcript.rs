//! Conversation transcript as the client shows it.
//!
//! Sentences of one reply arrive as separate audio chunks. While the queue is
//! still speaking, a new chunk's text extends the last assistant entry; once
//! playback has gone quiet, or after the user speaks, it starts a new entry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            speaker: Speaker::User,
            text: text.into(),
        });
    }

    /// Record the text of an incoming speech chunk.
    ///
    /// `is_speaking` must be sampled before the chunk itself is queued.
    pub fn apply_speech(&mut self, text: &str, is_speaking: bool) {
        if is_speaking {
            if let Some(last) = self.entries.last_mut() {
                if last.speaker == Speaker::Assistant {
                    if !last.text.is_empty() {
                        last.text.push(' ');
                    }
                    last.text.push_str(text);
                    return;
                }
            }
        }
        self.entries.push(TranscriptEntry {
            speaker: Speaker::Assistant,
            text: text.to_string(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_extends_assistant_entry_while_speaking() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.apply_speech("Hello there.", false);
        transcript.apply_speech("How can I help?", true);

        assert_eq!(transcript.entries().len(), 2);
        assert_eq!(transcript.last().unwrap().text, "Hello there. How can I help?");
    }

    #[test]
    fn test_quiet_playback_starts_new_entry() {
        let mut transcript = Transcript::new();
        transcript.apply_speech("First reply.", false);
        transcript.apply_speech("Second reply.", false);
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn test_user_entry_is_never_extended() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");
        transcript.apply_speech("Answer.", true);

        let entries = transcript.entries();
        assert_eq!(entries[0], TranscriptEntry { speaker: Speaker::User, text: "question".to_string() });
        assert_eq!(entries[1].speaker, Speaker::Assistant);
        assert_eq!(entries[1].text, "Answer.");
    }
}
