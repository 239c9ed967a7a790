//! Overlapping character-window chunker.
//!
//! Splits a file's text into [`Chunk`]s of at most `chunk_size` characters,
//! with consecutive chunks sharing up to `chunk_overlap` characters. Cuts
//! prefer a paragraph break, then a line break, then a space, as long as
//! the break falls in the second half of the window.
//!
//! Chunk ids are content-addressed: a SHA-256 over the source path, the
//! character offset, and the chunk text. Editing a file therefore yields new
//! ids for the affected spans while untouched spans keep theirs.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split `text` from `source_path` into chunks. Blank text yields no chunks.
pub fn chunk_text(source_path: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();
    if text.trim().is_empty() || chunk_size == 0 {
        return chunks;
    }

    let mut start = 0usize;
    let mut index: i64 = 0;
    loop {
        let end = (start + chunk_size).min(n);
        let cut = if end < n {
            find_break(&chars, start + chunk_size / 2, end).unwrap_or(end)
        } else {
            end
        };

        let piece: String = chars[start..cut].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(make_chunk(source_path, start, index, trimmed));
            index += 1;
        }

        if cut >= n {
            break;
        }
        // Start the overlap on a word boundary.
        let mut next = cut.saturating_sub(chunk_overlap).max(start + 1);
        while next < cut && !chars[next - 1].is_whitespace() {
            next += 1;
        }
        start = next;
    }

    chunks
}

/// Position just after the best break in `chars[lo..hi]`, searching backwards.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    if lo >= hi {
        return None;
    }
    let window = &chars[lo..hi];
    let paragraph = window
        .windows(2)
        .rposition(|w| w[0] == '\n' && w[1] == '\n')
        .map(|p| lo + p + 2);
    paragraph
        .or_else(|| window.iter().rposition(|c| *c == '\n').map(|p| lo + p + 1))
        .or_else(|| window.iter().rposition(|c| c.is_whitespace()).map(|p| lo + p + 1))
}

fn make_chunk(source_path: &str, offset: usize, index: i64, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(source_path, offset, text),
        source_path: source_path.to_string(),
        chunk_index: index,
        text: text.to_string(),
        embedding: Vec::new(),
    }
}

/// Stable id for a chunk: path, character offset and text all contribute.
pub fn chunk_id(source_path: &str, offset: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0u8]);
    hasher.update((offset as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("a.txt", "Hello, world!", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_path, "a.txt");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("a.txt", "", 100, 10).is_empty());
        assert!(chunk_text("a.txt", "  \n\n \t", 100, 10).is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_indices_contiguous() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc", &text, 50, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.chars().count() <= 50, "chunk too long: {}", c.text);
        }
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunk_text("doc", text, 24, 8);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_word_of_next = pair[1].text.split_whitespace().next().unwrap();
            assert!(
                pair[0].text.contains(first_word_of_next),
                "no overlap between {:?} and {:?}",
                pair[0].text,
                pair[1].text
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = "First paragraph here.\n\nSecond paragraph is here too.";
        let chunks = chunk_text("doc", text, 30, 0);
        assert_eq!(chunks[0].text, "First paragraph here.");
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "猫は哺乳類です。".repeat(40);
        let chunks = chunk_text("jp.txt", &text, 16, 4);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_ids_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc", text, 8, 2);
        let c2 = chunk_text("doc", text, 8, 2);
        let ids1: Vec<_> = c1.iter().map(|c| c.id.clone()).collect();
        let ids2: Vec<_> = c2.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn test_id_depends_on_path_and_content() {
        let a = chunk_text("a.txt", "same text", 100, 0);
        let b = chunk_text("b.txt", "same text", 100, 0);
        let c = chunk_text("a.txt", "same text!", 100, 0);
        assert_ne!(a[0].id, b[0].id);
        assert_ne!(a[0].id, c[0].id);
    }
}
