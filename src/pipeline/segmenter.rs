//! Splits a streamed completion into sentence-sized units.
//!
//! A unit is flushed at the first `.`, `!` or `?` followed by whitespace. When
//! no terminator shows up the buffer is flushed once it grows past
//! `max_chars`, so a long run-on reply still starts speaking. Units are
//! trimmed; blank segments are skipped without consuming a sequence number.

use super::SentenceUnit;

const TERMINATORS: [char; 3] = ['.', '!', '?'];

#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    next_sequence: u64,
    max_chars: usize,
}

impl SentenceSegmenter {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            next_sequence: 0,
            max_chars: max_chars.max(1),
        }
    }

    /// Append a delta and return every unit it completes, in order.
    pub fn push(&mut self, delta: &str) -> Vec<SentenceUnit> {
        self.buffer.push_str(delta);
        let mut units = Vec::new();

        while let Some(end) = sentence_end(&self.buffer) {
            let remainder = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, remainder);
            self.emit(&sentence, &mut units);
        }

        if self.buffer.chars().count() > self.max_chars {
            let overflow = std::mem::take(&mut self.buffer);
            self.emit(&overflow, &mut units);
        }

        units
    }

    /// Flush whatever is left once the completion stream has ended.
    pub fn finish(&mut self) -> Option<SentenceUnit> {
        let rest = std::mem::take(&mut self.buffer);
        let mut units = Vec::with_capacity(1);
        self.emit(&rest, &mut units);
        units.pop()
    }

    /// Sequence number the next unit will carry (also the count emitted so far).
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }

    fn emit(&mut self, segment: &str, units: &mut Vec<SentenceUnit>) {
        let text = segment.trim();
        if text.is_empty() {
            return;
        }
        units.push(SentenceUnit {
            sequence: self.next_sequence,
            text: text.to_string(),
        });
        self.next_sequence += 1;
    }
}

/// Byte offset just past the first terminator that is followed by whitespace.
fn sentence_end(buffer: &str) -> Option<usize> {
    let mut chars = buffer.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }
        if let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                return Some(idx + c.len_utf8());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(units: &[SentenceUnit]) -> Vec<&str> {
        units.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn test_two_sentence_reply() {
        let mut segmenter = SentenceSegmenter::new(200);
        let mut units = segmenter.push("Hello there.");
        assert!(units.is_empty(), "terminator at end of buffer waits for more input");

        units.extend(segmenter.push(" How can I help?"));
        units.extend(segmenter.finish());

        assert_eq!(texts(&units), vec!["Hello there.", "How can I help?"]);
        assert_eq!(units[0].sequence, 0);
        assert_eq!(units[1].sequence, 1);
    }

    #[test]
    fn test_several_sentences_in_one_delta() {
        let mut segmenter = SentenceSegmenter::new(200);
        let units = segmenter.push("One. Two! Three? Four");
        assert_eq!(texts(&units), vec!["One.", "Two!", "Three?"]);
        assert_eq!(segmenter.finish().unwrap().text, "Four");
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let mut segmenter = SentenceSegmenter::new(200);
        assert!(segmenter.push("Pi is 3.14 roughly").is_empty());
        assert_eq!(segmenter.finish().unwrap().text, "Pi is 3.14 roughly");
    }

    #[test]
    fn test_overflow_flushes_whole_buffer() {
        let mut segmenter = SentenceSegmenter::new(10);
        assert!(segmenter.push("abcdefghij").is_empty());
        let units = segmenter.push("k");
        assert_eq!(texts(&units), vec!["abcdefghijk"]);
        assert!(segmenter.finish().is_none());
    }

    #[test]
    fn test_overflow_counts_chars_not_bytes() {
        let mut segmenter = SentenceSegmenter::new(5);
        assert!(segmenter.push("ééééé").is_empty());
    }

    #[test]
    fn test_blank_segments_skip_sequence_numbers() {
        let mut segmenter = SentenceSegmenter::new(200);
        assert!(segmenter.push("   ").is_empty());
        let units = segmenter.push("\n\nFine. ");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sequence, 0);
        assert!(segmenter.finish().is_none());
        assert_eq!(segmenter.emitted(), 1);
    }

    #[test]
    fn test_token_by_token_stream() {
        let mut segmenter = SentenceSegmenter::new(200);
        let mut units = Vec::new();
        for token in ["Sure", "!", " Here", " you", " go", ".", " Bye"] {
            units.extend(segmenter.push(token));
        }
        units.extend(segmenter.finish());
        assert_eq!(texts(&units), vec!["Sure!", "Here you go.", "Bye"]);
        let sequences: Vec<u64> = units.iter().map(|u| u.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }
}
