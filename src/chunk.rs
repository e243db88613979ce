//! Separator-aware character splitter with overlap.
//!
//! Splits the assembled corpus into windows of at most `chunk_size`
//! characters that overlap their predecessor by up to `chunk_overlap`
//! characters. Lengths are measured in Unicode scalar values, never bytes,
//! so a window never cuts a character in half.
//!
//! # Algorithm
//!
//! 1. Cut the text into pieces, each ending just after an occurrence of the
//!    separator (the separator stays attached, so the pieces concatenate
//!    back to the input).
//! 2. Hard-cut any piece longer than `chunk_size` into windows of
//!    `chunk_size` characters stepping by `chunk_size - chunk_overlap`.
//! 3. Merge pieces into a buffer. When the next piece would overflow
//!    `chunk_size`, flush the buffer as a chunk, then drop leading pieces
//!    until what remains is no longer than `chunk_overlap` and the next
//!    piece fits. The remainder seeds the next chunk.
//! 4. Trim whitespace from every flushed chunk; drop chunks that end up
//!    empty.
//!
//! # Example
//!
//! ```rust
//! use chat_harness::chunk::CharacterSplitter;
//!
//! let splitter = CharacterSplitter::new(1000, 200, "\n");
//! let chunks = splitter.split_text("File: a.txt\n\nhello world");
//! assert_eq!(chunks, vec!["File: a.txt\n\nhello world".to_string()]);
//! ```

use std::collections::VecDeque;

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl CharacterSplitter {
    /// Build a splitter. `chunk_overlap` is clamped below `chunk_size` and
    /// an empty separator falls back to `"\n"`; [`crate::config::validate`]
    /// rejects both cases for configured values.
    pub fn new(chunk_size: usize, chunk_overlap: usize, separator: &str) -> Self {
        let chunk_size = chunk_size.max(1);
        let separator = if separator.is_empty() { "\n" } else { separator };
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separator: separator.to_string(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, &config.separator)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into overlapping windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut pieces: Vec<(&str, usize)> = Vec::new();
        for piece in split_keep_separator(text, &self.separator) {
            let len = piece.chars().count();
            if len > self.chunk_size {
                for window in hard_cut(piece, self.chunk_size, self.chunk_overlap) {
                    pieces.push((window, window.chars().count()));
                }
            } else {
                pieces.push((piece, len));
            }
        }
        self.merge(pieces)
    }

    /// Split `text` and number the results from 0.
    pub fn split_chunks(&self, text: &str) -> Vec<Chunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect()
    }

    fn merge(&self, pieces: Vec<(&str, usize)>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for (piece, len) in pieces {
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&current, &mut chunks);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        push_joined(&current, &mut chunks);

        debug!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "split corpus"
        );
        chunks
    }
}

impl Default for CharacterSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn push_joined(pieces: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Cut `text` after every occurrence of `separator`, keeping the separator
/// at the end of its piece. Never yields empty pieces.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, matched) in text.match_indices(separator) {
        let end = pos + matched.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Windows of `size` characters over `piece`, each starting
/// `size - overlap` characters after the previous one.
fn hard_cut(piece: &str, size: usize, overlap: usize) -> Vec<&str> {
    let bounds: Vec<usize> = piece
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(piece.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    let step = size - overlap;

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(n_chars);
        windows.push(&piece[bounds[start]..bounds[end]]);
        if end == n_chars {
            break;
        }
        start += step;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> String {
        // Each row is exactly 10 characters including its newline.
        (0..n).map(|i| format!("row {:02} ab\n", i)).collect()
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = CharacterSplitter::default().split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(CharacterSplitter::default().split_text("").is_empty());
        assert!(CharacterSplitter::default().split_text("\n\n  \n").is_empty());
    }

    #[test]
    fn file_block_stays_whole() {
        let chunks = CharacterSplitter::default().split_text("File: a.txt\n\nhello world");
        assert_eq!(chunks, vec!["File: a.txt\n\nhello world".to_string()]);
    }

    #[test]
    fn chunks_respect_size_and_carry_overlap() {
        let text = rows(30);
        let splitter = CharacterSplitter::new(50, 20, "\n");
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {:?}", c);
            assert!(text.contains(c.as_str()));
        }
        assert!(chunks[0].starts_with("row 00"));
        assert!(chunks[0].ends_with("row 04 ab"));
        // Rows 03 and 04 (20 chars) are carried into the next chunk.
        assert!(chunks[1].starts_with("row 03 ab\nrow 04 ab\nrow 05"));
        assert!(chunks.last().unwrap().ends_with("row 29 ab"));
    }

    #[test]
    fn zero_overlap_partitions_rows() {
        let text = rows(10);
        let chunks = CharacterSplitter::new(50, 0, "\n").split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with("row 05"));
    }

    #[test]
    fn oversized_run_is_hard_cut_with_overlap() {
        let text = "a".repeat(2500);
        let chunks = CharacterSplitter::new(1000, 200, "\n").split_text(&text);
        let lens: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lens, vec![1000, 1000, 900]);
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        let text = "é".repeat(25);
        let chunks = CharacterSplitter::new(10, 2, "\n").split_text(&text);
        for c in &chunks {
            assert!(c.chars().count() <= 10);
            assert!(c.chars().all(|ch| ch == 'é'));
        }
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn deterministic() {
        let text = rows(40);
        let splitter = CharacterSplitter::new(64, 16, "\n");
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }

    #[test]
    fn chunk_indices_contiguous() {
        let chunks = CharacterSplitter::new(30, 5, "\n").split_chunks(&rows(20));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn overlap_clamped_below_size() {
        let splitter = CharacterSplitter::new(10, 50, "\n");
        assert_eq!(splitter.chunk_overlap(), 9);
    }

    /// Every non-whitespace byte of `text` falls inside some chunk, locating
    /// the chunks left to right. `text` must be ASCII with no repeated
    /// chunk-sized substrings.
    fn assert_no_text_lost(text: &str, chunks: &[String]) {
        let mut covered = vec![false; text.len()];
        let mut from = 0;
        for chunk in chunks {
            let start = from
                + text[from..]
                    .find(chunk.as_str())
                    .unwrap_or_else(|| panic!("chunk out of order: {:?}", chunk));
            covered[start..start + chunk.len()].fill(true);
            from = start + 1;
        }
        for (i, b) in text.bytes().enumerate() {
            assert!(b.is_ascii_whitespace() || covered[i], "byte {} lost", i);
        }
    }

    #[test]
    fn every_line_survives_in_order() {
        let text: String = (0..300)
            .map(|i| format!("entry {:04}: {}\n\n", i, "x".repeat(i % 41)))
            .collect();
        let chunks = CharacterSplitter::default().split_text(&text);
        assert!(chunks.len() > 5);

        let mut at = 0;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            while at < chunks.len() && !chunks[at].contains(line) {
                at += 1;
            }
            assert!(at < chunks.len(), "line missing or out of order: {}", line);
        }
        assert_no_text_lost(&text, &chunks);
    }

    #[test]
    fn oversized_run_is_covered_end_to_end() {
        let run: String = (0..600).map(|i| format!("{:04}", i)).collect();
        let text = format!("header line\n{}\ntrailer line\n", run);
        let chunks = CharacterSplitter::default().split_text(&text);

        assert_eq!(chunks.first().map(String::as_str), Some("header line"));
        assert!(chunks.last().unwrap().ends_with("trailer line"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
        assert_no_text_lost(&text, &chunks);
    }

    #[test]
    fn pieces_reassemble_to_input() {
        let text = "a\nb\n\nc";
        assert_eq!(split_keep_separator(text, "\n").concat(), text);
        assert_eq!(split_keep_separator(text, "\n"), vec!["a\n", "b\n", "\n", "c"]);
    }
}
