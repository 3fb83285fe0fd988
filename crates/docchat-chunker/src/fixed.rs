//! Fixed-size chunking strategy with overlap.

use async_trait::async_trait;
use docchat_core::{Chunk, ChunkConfig, ChunkError, Chunker, ConfigError, Document, META_START_CHAR};

/// Sliding-window chunker measured in characters.
///
/// Windows start every `chunk_size - chunk_overlap` characters. A window's end
/// snaps back to a paragraph break, newline, sentence end or space found in its
/// last fifth, but never past `chunk_size` and never before the next window
/// starts, so no text is skipped.
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new fixed-size chunker.
    ///
    /// `chunk_overlap` is clamped below `chunk_size`; use
    /// [`from_config`](Self::from_config) to reject invalid bounds instead.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Create a chunker from validated configuration.
    pub fn from_config(config: &ChunkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.chunk_size, config.chunk_overlap))
    }

    /// Longest window, in characters.
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Distance between consecutive window starts.
    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Split text into `(start_char, text)` windows.
    pub(crate) fn split(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let step = self.step();

        let mut windows = Vec::new();
        let mut start = 0;
        while start < total {
            let target_end = (start + self.chunk_size).min(total);
            let min_end = (start + step).min(target_end);
            let end = find_break_point(&chars, start, target_end, min_end, total);

            let window: String = chars[start..end].iter().collect();
            if !window.trim().is_empty() {
                windows.push((start, window));
            }

            if end >= total {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        let config = ChunkConfig::default();
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

#[async_trait]
impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed_size"
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        if document.text.is_empty() {
            return Ok(vec![]);
        }

        Ok(self
            .split(&document.text)
            .into_iter()
            .map(|(start, text)| Chunk {
                text,
                metadata: document.metadata.clone(),
            }
            .with_metadata(META_START_CHAR, start))
            .collect())
    }
}

/// Find a good break point in `min_end..=target_end`.
fn find_break_point(
    chars: &[char],
    start: usize,
    target_end: usize,
    min_end: usize,
    total: usize,
) -> usize {
    if target_end >= total {
        return total;
    }

    // Look within the last 20% of the window
    let search_start = target_end
        .saturating_sub((target_end - start) / 5)
        .max(min_end);

    // Prefer double newline (paragraph break)
    for i in (search_start..target_end.saturating_sub(1)).rev() {
        if chars[i] == '\n' && chars[i + 1] == '\n' {
            return i + 2;
        }
    }

    // Then single newline
    for i in (search_start..target_end).rev() {
        if chars[i] == '\n' {
            return i + 1;
        }
    }

    // Then sentence end
    for i in (search_start..target_end).rev() {
        if matches!(chars[i], '.' | '!' | '?') && i + 1 < total && chars[i + 1].is_whitespace() {
            return i + 1;
        }
    }

    // Then any whitespace
    for i in (search_start..target_end).rev() {
        if chars[i].is_whitespace() {
            return i + 1;
        }
    }

    target_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::{META_PAGE, MetadataValue};

    fn start_of(chunk: &Chunk) -> usize {
        chunk.metadata[META_START_CHAR].as_i64().unwrap() as usize
    }

    #[tokio::test]
    async fn test_chunk_empty_text() {
        let chunker = FixedSizeChunker::default();
        let chunks = chunker.chunk(&Document::new("")).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_whitespace_only() {
        let chunker = FixedSizeChunker::default();
        let chunks = chunker.chunk(&Document::new("   \n\n\t  ")).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_short_text() {
        let chunker = FixedSizeChunker::new(500, 100);
        let chunks = chunker
            .chunk(&Document::new("This is a short text."))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "This is a short text.");
        assert_eq!(start_of(&chunks[0]), 0);
    }

    #[tokio::test]
    async fn test_chunk_size_contract() {
        let chunker = FixedSizeChunker::new(500, 100);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(120);
        let chunks = chunker.chunk(&Document::new(text.clone())).await.unwrap();

        assert!(chunks.len() > 1, "Should create multiple chunks");
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 500);
        }
        for pair in chunks.windows(2) {
            let gap = start_of(&pair[1]) - start_of(&pair[0]);
            assert!(gap <= 400, "consecutive starts {gap} apart");
        }

        // Every character is covered by some chunk
        let total = text.chars().count();
        let mut covered = vec![false; total];
        for chunk in &chunks {
            let s = start_of(chunk);
            for c in covered.iter_mut().skip(s).take(chunk.text.chars().count()) {
                *c = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[tokio::test]
    async fn test_chunk_without_break_points() {
        let chunker = FixedSizeChunker::new(100, 20);
        let text = "A".repeat(450);
        let chunks = chunker.chunk(&Document::new(text)).await.unwrap();

        let starts: Vec<usize> = chunks.iter().map(start_of).collect();
        assert_eq!(starts, vec![0, 80, 160, 240, 320, 400]);
        assert_eq!(chunks[0].text.len(), 100);
        assert_eq!(chunks.last().unwrap().text.len(), 50);
    }

    #[tokio::test]
    async fn test_chunk_overlap_is_shared() {
        let chunker = FixedSizeChunker::new(100, 20);
        let text: String = (0..300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunker.chunk(&Document::new(text)).await.unwrap();

        let first_tail = &chunks[0].text[80..];
        let second_head = &chunks[1].text[..20];
        assert_eq!(first_tail, second_head);
    }

    #[tokio::test]
    async fn test_chunk_respects_paragraph_breaks() {
        let chunker = FixedSizeChunker::new(200, 40);
        let text = format!("{}\n\n{}", "a".repeat(170), "b".repeat(300));
        let chunks = chunker.chunk(&Document::new(text)).await.unwrap();

        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(chunks[0].text.chars().count(), 172);
    }

    #[tokio::test]
    async fn test_chunk_copies_document_metadata() {
        let chunker = FixedSizeChunker::new(50, 10);
        let document = Document::new("word ".repeat(40)).with_metadata(META_PAGE, 3usize);
        let chunks = chunker.chunk(&document).await.unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.get(META_PAGE), Some(&MetadataValue::Int(3)));
        }
    }

    #[tokio::test]
    async fn test_chunk_unicode_text() {
        let chunker = FixedSizeChunker::new(10, 2);
        let text = "Hello 世界! 🌍 Привет мир! مرحبا";
        let chunks = chunker.chunk(&Document::new(text)).await.unwrap();

        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 10);
        }
        assert!(chunks[0].text.starts_with("Hello"));
    }

    #[test]
    fn test_from_config_rejects_overlap() {
        let config = ChunkConfig {
            chunk_size: 50,
            chunk_overlap: 60,
            ..Default::default()
        };
        assert!(FixedSizeChunker::from_config(&config).is_err());
    }

    #[test]
    fn test_new_clamps_overlap() {
        let chunker = FixedSizeChunker::new(10, 50);
        assert_eq!(chunker.step(), 1);
    }

    #[test]
    fn test_chunker_name() {
        assert_eq!(FixedSizeChunker::default().name(), "fixed_size");
    }

    #[test]
    fn test_find_break_point_at_end() {
        let chars: Vec<char> = "Hello world".chars().collect();
        let result = find_break_point(&chars, 0, 20, 5, chars.len());
        assert_eq!(result, chars.len());
    }

    #[test]
    fn test_find_break_point_at_newline() {
        let chars: Vec<char> = "Hello\nworld and more".chars().collect();
        let result = find_break_point(&chars, 0, 6, 1, chars.len());
        assert_eq!(result, 6);
    }

    #[test]
    fn test_find_break_point_at_paragraph() {
        let text = format!("{}\n\nb\n{}", "a".repeat(16), "c".repeat(10));
        let chars: Vec<char> = text.chars().collect();
        // A later single newline exists, but the paragraph break wins
        let result = find_break_point(&chars, 0, 20, 1, chars.len());
        assert_eq!(result, 18);
    }

    #[test]
    fn test_find_break_point_never_before_min_end() {
        let chars: Vec<char> = "ab\ncdefghijklmnop".chars().collect();
        // Newline at 2 is before min_end, so fall back to the target
        let result = find_break_point(&chars, 0, 10, 8, chars.len());
        assert_eq!(result, 10);
    }
}
