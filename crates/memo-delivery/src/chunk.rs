//! Message splitting
//!
//! The memo text template accepts at most 200 characters, so longer
//! summaries are sent as consecutive chunks. Lengths are counted in
//! characters (Unicode scalar values), never bytes, and a split never lands
//! inside a character.

/// Text template character limit.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 200;

/// One ordered slice of the outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageChunk<'a> {
    /// 1-based position in the message
    pub number: usize,
    pub text: &'a str,
}

/// Split `message` into chunks of at most `max_chars` characters.
///
/// Concatenating the chunks in order reproduces `message` exactly. The empty
/// message yields no chunks; a message within the limit yields one. When a
/// full-size window contains a newline after its first character, the chunk
/// ends just after the last such newline so quote lines stay whole.
pub fn split_message(message: &str, max_chars: usize) -> Vec<MessageChunk<'_>> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = message;

    while !rest.is_empty() {
        let cut = match rest.char_indices().nth(max_chars) {
            None => rest.len(),
            Some((window_end, _)) => match rest[..window_end].rfind('\n') {
                Some(newline) if newline > 0 => newline + 1,
                _ => window_end,
            },
        };

        let (text, tail) = rest.split_at(cut);
        chunks.push(MessageChunk {
            number: chunks.len() + 1,
            text,
        });
        rest = tail;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts<'a>(chunks: &[MessageChunk<'a>]) -> Vec<&'a str> {
        chunks.iter().map(|c| c.text).collect()
    }

    fn assert_invariants(message: &str, max_chars: usize) {
        let chunks = split_message(message, max_chars);
        let joined: String = chunks.iter().map(|c| c.text).collect();
        assert_eq!(joined, message, "round trip failed for limit {max_chars}");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.number, i + 1);
            assert!(!chunk.text.is_empty());
            assert!(
                chunk.text.chars().count() <= max_chars,
                "chunk {} has {} chars, limit {max_chars}",
                chunk.number,
                chunk.text.chars().count()
            );
        }
        if !message.is_empty() && message.chars().count() <= max_chars {
            assert_eq!(chunks.len(), 1);
        }
    }

    #[test]
    fn empty_message_has_no_chunks() {
        assert!(split_message("", 200).is_empty());
    }

    #[test]
    fn short_message_is_single_chunk() {
        let chunks = split_message("AAPL: 189.84 🔺 (+1.20)", 200);
        assert_eq!(texts(&chunks), vec!["AAPL: 189.84 🔺 (+1.20)"]);
        assert_eq!(chunks[0].number, 1);
    }

    #[test]
    fn exact_limit_is_single_chunk() {
        let message = "x".repeat(200);
        assert_eq!(split_message(&message, 200).len(), 1);
    }

    #[test]
    fn hard_split_without_newlines() {
        let chunks = split_message("aaaaabbbbbccccc", 5);
        assert_eq!(texts(&chunks), vec!["aaaaa", "bbbbb", "ccccc"]);
    }

    #[test]
    fn prefers_splitting_after_newline() {
        let chunks = split_message("ab\ncdef\ngh", 6);
        assert_eq!(texts(&chunks), vec!["ab\n", "cdef\n", "gh"]);
    }

    #[test]
    fn leading_newline_does_not_produce_tiny_chunk() {
        let chunks = split_message("\nabcdefgh", 4);
        assert_eq!(texts(&chunks), vec!["\nabc", "defg", "h"]);
    }

    #[test]
    fn multibyte_characters_are_never_split() {
        let message = "주식정보📊가격🔺하락🔻";
        let chunks = split_message(message, 3);
        assert_eq!(
            texts(&chunks),
            vec!["주식정", "보📊가", "격🔺하", "락🔻"]
        );
        assert_invariants(message, 3);
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        assert_eq!(texts(&split_message("abc", 0)), vec!["a", "b", "c"]);
    }

    const ALPHABET: &[char] = &['a', 'Z', ' ', '\n', '주', '식', '🔺', '➡', '.', '9'];

    fn mixed_text() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(ALPHABET), 0..700)
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn invariants_hold_for_mixed_text(message in mixed_text(), max_chars in 1..300usize) {
            assert_invariants(&message, max_chars);
        }

        #[test]
        fn invariants_hold_for_arbitrary_text(message in any::<String>(), max_chars in 1..300usize) {
            assert_invariants(&message, max_chars);
        }
    }
}
