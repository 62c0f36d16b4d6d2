// file: src/extract/mod.rs
// description: extraction contract and file-format adapters
// reference: internal module structure

pub mod classifier;
pub mod files;
pub mod html;
pub mod markdown;
pub mod patterns;
pub mod scanner;

use crate::chunker::records::{RecordSet, flatten_record};
use crate::error::Result;
use std::path::Path;

pub use classifier::{FileClassifier, Rejection};
pub use files::FileExtractor;
pub use patterns::clean_text;
pub use scanner::{FileScanner, ScannedFile};

/// Text and structured records pulled from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub tables: Vec<RecordSet>,
    /// Units (rows, sections, pages) that failed and were left out.
    pub skipped: Vec<String>,
}

impl Extracted {
    pub fn text(text: String) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }

    /// Non-whitespace characters across text and flattened records.
    pub fn content_chars(&self) -> usize {
        let text = self.text.chars().filter(|c| !c.is_whitespace()).count();
        let records: usize = self
            .tables
            .iter()
            .flat_map(|set| set.records.iter())
            .map(|record| {
                flatten_record(record)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .count()
            })
            .sum();
        text + records
    }
}

/// Format-specific extraction. Blocking; run it off the async runtime.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Extracted>;
}
