//! Word-window chunking
//!
//! Text is normalized to single-space-separated words and cut into windows of
//! `window_size` words that overlap by `overlap` words. Chunk `i` starts at
//! word `i * (window_size - overlap)`; the last chunk is the first one whose
//! end reaches the final word.

use crate::error::ChunkError;
use crate::types::Chunk;

pub const DEFAULT_WINDOW_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 50;

/// Validated window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    window_size: usize,
    overlap: usize,
}

impl Default for ChunkWindow {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkWindow {
    /// Rejects `overlap >= window_size`, which would never advance.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if window_size == 0 || overlap >= window_size {
            return Err(ChunkError::InvalidWindow {
                window_size,
                overlap,
            });
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.window_size - self.overlap
    }

    /// Number of chunks produced for `word_count` words.
    pub fn chunk_count(&self, word_count: usize) -> usize {
        if word_count <= self.window_size {
            1
        } else {
            (word_count - self.overlap).div_ceil(self.stride())
        }
    }

    /// Lazily yield the chunk strings for `text`.
    pub fn windows<'a>(&self, text: &'a str) -> WordWindows<'a> {
        WordWindows {
            words: text.split_whitespace().collect(),
            window: *self,
            start: 0,
            done: false,
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.windows(text).collect()
    }
}

/// Iterator over the overlapping windows of one text.
pub struct WordWindows<'a> {
    words: Vec<&'a str>,
    window: ChunkWindow,
    start: usize,
    done: bool,
}

impl Iterator for WordWindows<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let total = self.words.len();
        if total <= self.window.window_size {
            self.done = true;
            return Some(self.words.join(" "));
        }

        let end = (self.start + self.window.window_size).min(total);
        let chunk = self.words[self.start..end].join(" ");
        if end >= total {
            self.done = true;
        } else {
            self.start += self.window.stride();
        }
        Some(chunk)
    }
}

/// Split `text` into overlapping word windows.
///
/// Text of at most `window_size` words comes back as a single normalized
/// string (empty text yields one empty string).
pub fn split_text(text: &str, window_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Ok(ChunkWindow::new(window_size, overlap)?.split(text))
}

/// Chunk one document's text and attach chunk metadata.
pub fn build_chunks(source_file: &str, stem: &str, text: &str, window: &ChunkWindow) -> Vec<Chunk> {
    window
        .windows(text)
        .enumerate()
        .map(|(i, chunk_text)| Chunk::new(source_file, stem, i, chunk_text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (1..=n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_degenerate_windows() {
        assert!(ChunkWindow::new(0, 0).is_err());
        assert!(ChunkWindow::new(10, 10).is_err());
        assert_eq!(
            split_text("a b c", 5, 7),
            Err(ChunkError::InvalidWindow {
                window_size: 5,
                overlap: 7
            })
        );
        assert!(ChunkWindow::new(10, 9).is_ok());
    }

    #[test]
    fn short_text_is_single_normalized_chunk() {
        let chunks = split_text("  hello \n\t world  ", 500, 50).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
        assert_eq!(split_text("", 500, 50).unwrap(), vec![String::new()]);
    }

    #[test]
    fn exact_window_is_single_chunk() {
        let text = numbered_words(500);
        assert_eq!(split_text(&text, 500, 50).unwrap().len(), 1);
    }

    #[test]
    fn six_hundred_words_make_two_chunks() {
        let text = numbered_words(600);
        let chunks = split_text(&text, 500, 50).unwrap();
        assert_eq!(chunks.len(), 2);

        let first: Vec<&str> = chunks[0].split(' ').collect();
        let second: Vec<&str> = chunks[1].split(' ').collect();
        assert_eq!(first.len(), 500);
        assert_eq!(first[0], "w1");
        assert_eq!(first[499], "w500");
        assert_eq!(second.len(), 150);
        assert_eq!(second[0], "w451");
        assert_eq!(second[149], "w600");
    }

    #[test]
    fn chunks_cover_every_word_in_order() {
        for (n, w, o) in [(1000, 100, 10), (1234, 200, 0), (77, 10, 9), (501, 500, 50)] {
            let text = numbered_words(n);
            let window = ChunkWindow::new(w, o).unwrap();
            let chunks = window.split(&text);
            assert_eq!(chunks.len(), window.chunk_count(n), "count for n={n} w={w} o={o}");

            let mut covered = vec![false; n];
            for (i, chunk) in chunks.iter().enumerate() {
                let words: Vec<&str> = chunk.split(' ').collect();
                assert!(words.len() <= w);
                assert_eq!(words[0], format!("w{}", i * window.stride() + 1));
                for word in words {
                    let idx: usize = word[1..].parse().unwrap();
                    covered[idx - 1] = true;
                }
            }
            assert!(covered.iter().all(|c| *c));
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = numbered_words(950);
        let window = ChunkWindow::new(300, 30).unwrap();
        assert_eq!(window.split(&text), window.split(&text));
        assert_eq!(window.windows(&text).count(), window.chunk_count(950));
    }

    #[test]
    fn build_chunks_attaches_metadata() {
        let text = numbered_words(600);
        let chunks = build_chunks("report.txt", "report", &text, &ChunkWindow::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "report_chunk_0");
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].word_count, 150);
        assert_eq!(chunks[1].character_count, chunks[1].text.chars().count());
        assert!(chunks.iter().all(|c| c.source_file == "report.txt"));
    }
}
