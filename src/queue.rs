//! Typing queue construction
//!
//! Splits the session text into the ordered units the engine hands to the
//! input emitter. Splitting is done on `char` boundaries so multi-byte text
//! is never cut mid-character.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default run length for chunked emission
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// How many characters go into one emission unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Granularity {
    /// One unit per character, spaces included
    #[default]
    Character,
    /// Fixed-size runs of characters; the last run may be shorter
    Chunked(usize),
}

impl Granularity {
    /// Granularity from a chunk size where 0 and 1 mean per-character.
    pub fn from_chunk_size(size: usize) -> Self {
        if size <= 1 {
            Self::Character
        } else {
            Self::Chunked(size)
        }
    }

    fn run_len(self) -> usize {
        match self {
            Self::Character => 1,
            Self::Chunked(n) => n.max(1),
        }
    }
}

/// One piece of text passed to the emitter in a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionUnit {
    /// Text to emit
    pub text: String,
    /// Character following this unit in the source text
    pub next: Option<char>,
    char_count: usize,
}

impl EmissionUnit {
    /// Number of characters in this unit
    pub fn char_len(&self) -> usize {
        self.char_count
    }

    /// Trailing character, used for delay context
    pub fn last_char(&self) -> Option<char> {
        self.text.chars().next_back()
    }
}

/// Ordered FIFO of emission units
pub type TypingQueue = VecDeque<EmissionUnit>;

/// Build the typing queue for `text`.
///
/// Deterministic: the same text and granularity always give the same queue.
pub fn build(text: &str, granularity: Granularity) -> TypingQueue {
    let chars: Vec<char> = text.chars().collect();
    let run = granularity.run_len();

    chars
        .chunks(run)
        .enumerate()
        .map(|(i, chunk)| EmissionUnit {
            text: chunk.iter().collect(),
            next: chars.get((i + 1) * run).copied(),
            char_count: chunk.len(),
        })
        .collect()
}

/// Total character count the queue for `text` will report as progress.
pub fn total_chars(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(queue: &TypingQueue) -> String {
        queue.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn character_units_preserve_order_and_spaces() {
        let q = build("a b", Granularity::Character);
        let units: Vec<&str> = q.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(units, vec!["a", " ", "b"]);
    }

    #[test]
    fn next_char_points_past_the_unit() {
        let q = build("Hi!", Granularity::Character);
        assert_eq!(q[0].next, Some('i'));
        assert_eq!(q[1].next, Some('!'));
        assert_eq!(q[2].next, None);
        assert_eq!(q[2].last_char(), Some('!'));
    }

    #[test]
    fn chunks_last_may_be_short() {
        let q = build("abcdefghijklm", Granularity::Chunked(5));
        let units: Vec<&str> = q.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(units, vec!["abcde", "fghij", "klm"]);
        assert_eq!(q[0].last_char(), Some('e'));
        assert_eq!(q[0].next, Some('f'));
        assert_eq!(q[2].char_len(), 3);
        assert_eq!(q[2].next, None);
    }

    #[test]
    fn multibyte_text_round_trips() {
        let samples = [
            "สวัสดีครับ",
            "naïve café — über",
            "emoji 🎉 and 日本語 text",
            "  leading and trailing  ",
            "line one\nline two\r\n",
        ];
        for text in samples {
            for g in [
                Granularity::Character,
                Granularity::Chunked(3),
                Granularity::Chunked(DEFAULT_CHUNK_SIZE),
            ] {
                let q = build(text, g);
                assert_eq!(joined(&q), text);
                let counted: usize = q.iter().map(EmissionUnit::char_len).sum();
                assert_eq!(counted, total_chars(text));
            }
        }
    }

    #[test]
    fn pseudo_random_strings_round_trip() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let alphabet: Vec<char> = "ab cXYZ.,!?\n\té漢🙂ก".chars().collect();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let len = rng.gen_range(0..64);
            let text: String = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let chunk = rng.gen_range(0..12);
            let q = build(&text, Granularity::from_chunk_size(chunk));
            assert_eq!(joined(&q), text);
        }
    }

    #[test]
    fn rebuild_is_deterministic() {
        let a = build("repeat me", Granularity::Chunked(4));
        let b = build("repeat me", Granularity::Chunked(4));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_gives_empty_queue() {
        assert!(build("", Granularity::Character).is_empty());
        assert!(build("", Granularity::Chunked(10)).is_empty());
    }

    #[test]
    fn chunk_size_zero_or_one_is_per_character() {
        assert_eq!(Granularity::from_chunk_size(0), Granularity::Character);
        assert_eq!(Granularity::from_chunk_size(1), Granularity::Character);
        assert_eq!(Granularity::from_chunk_size(8), Granularity::Chunked(8));
        assert_eq!(build("abc", Granularity::Chunked(0)).len(), 3);
    }
}
