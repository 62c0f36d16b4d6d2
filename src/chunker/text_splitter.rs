// file: src/chunker/text_splitter.rs
// description: overlapping window splitter preferring paragraph, sentence and word boundaries
// reference: recursive character text splitting

use crate::error::{PipelineError, Result};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::Validation(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if chunk_overlap >= chunk_size {
            return Err(PipelineError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: SEPARATORS.iter().map(|s| s.chars().collect()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into windows of at most `chunk_size` characters.
    ///
    /// Every window after the first starts with the last `chunk_overlap`
    /// characters of the previous one. Windows are not trimmed.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let window_end = (start + self.chunk_size).min(total);

            if window_end == total {
                chunks.push(chars[start..total].iter().collect());
                break;
            }

            let end = self.find_cut(&chars, start, window_end);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Latest boundary in the window, by separator priority, or a hard cut.
    fn find_cut(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        // Cuts below this point would stall progress or produce tiny windows.
        let earliest = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);

        for separator in &self.separators {
            let width = separator.len();
            let mut pos = window_end;
            while pos >= earliest && pos >= start + width {
                if chars[pos - width..pos] == separator[..] {
                    return pos;
                }
                pos -= 1;
            }
        }

        window_end
    }
}

pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    Ok(TextSplitter::new(chunk_size, chunk_overlap)?.split(text))
}
