//! Incremental sentence segmentation for transcript text.
//!
//! A [`Distiller`] accumulates text fragments as they arrive from the
//! transcription stream and hands back everything up to the most recent
//! sentence terminator. Whatever follows the terminator stays buffered until a
//! later fragment completes it.

// std::sync::Mutex is correct here: the lock is never held across .await points.
use std::sync::Mutex;

/// Characters that end a sentence.
///
/// Full-width CJK punctuation plus ASCII `?` and `!`. A plain `.` is too
/// common inside numbers and abbreviations to end a sentence.
pub const TERMINATORS: &[char] = &['。', '？', '！', '?', '!'];

/// Stateful sentence segmenter for one conversation.
#[derive(Debug, Default)]
pub struct Distiller {
    buffer: Mutex<String>,
}

impl Distiller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment` and return the completed text, if any.
    ///
    /// The returned text runs from the start of the buffer through the last
    /// terminator in it, so a fragment that completes several sentences yields
    /// them together in a single emission. Text after the last terminator is
    /// kept for the next call.
    pub fn process(&self, fragment: &str) -> Option<String> {
        let mut buffer = self.buffer.lock().expect("mutex poisoned");
        buffer.push_str(fragment);

        let (idx, terminator) = buffer
            .char_indices()
            .rev()
            .find(|(_, c)| TERMINATORS.contains(c))?;
        let split_at = idx + terminator.len_utf8();

        let remainder = buffer.split_off(split_at);
        let sentence = std::mem::replace(&mut *buffer, remainder);
        Some(sentence)
    }

    /// Text received but not yet terminated.
    pub fn pending(&self) -> String {
        self.buffer.lock().expect("mutex poisoned").clone()
    }

    /// Take the unterminated remainder, leaving the buffer empty.
    pub fn take_pending(&self) -> String {
        std::mem::take(&mut *self.buffer.lock().expect("mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_text_until_terminator() {
        let d = Distiller::new();
        assert_eq!(d.process("Hello world"), None);
        assert_eq!(d.pending(), "Hello world");

        assert_eq!(d.process("!"), Some("Hello world!".to_string()));
        assert_eq!(d.pending(), "");
    }

    #[test]
    fn keeps_text_after_last_terminator() {
        let d = Distiller::new();
        assert_eq!(d.process("今天天气很好。我们"), Some("今天天气很好。".to_string()));
        assert_eq!(d.pending(), "我们");

        assert_eq!(d.process("去公园吧！"), Some("我们去公园吧！".to_string()));
        assert_eq!(d.pending(), "");
    }

    #[test]
    fn several_sentences_in_one_fragment_emit_once() {
        let d = Distiller::new();
        let out = d.process("你好。你是谁？我很好！还有");
        assert_eq!(out, Some("你好。你是谁？我很好！".to_string()));
        assert_eq!(d.pending(), "还有");
    }

    #[test]
    fn ascii_period_does_not_end_a_sentence() {
        let d = Distiller::new();
        assert_eq!(d.process("Pi is 3.14, e.g. roughly"), None);
        assert_eq!(
            d.process(" three?"),
            Some("Pi is 3.14, e.g. roughly three?".to_string())
        );
    }

    #[test]
    fn empty_fragment_emits_nothing() {
        let d = Distiller::new();
        assert_eq!(d.process(""), None);
        assert_eq!(d.pending(), "");
    }

    #[test]
    fn emissions_plus_remainder_reconstruct_input() {
        let fragments = ["早上", "好。今天", "要开会？", "是的", "！下午", "三点"];
        let d = Distiller::new();

        let mut rebuilt = String::new();
        for fragment in fragments {
            if let Some(sentence) = d.process(fragment) {
                rebuilt.push_str(&sentence);
            }
        }
        rebuilt.push_str(&d.take_pending());

        assert_eq!(rebuilt, fragments.concat());
        assert_eq!(d.pending(), "");
    }
}
