// file: src/extract/classifier.rs
// description: file type classification by extension
// reference: extension-based document categories

use std::fmt;
use std::path::Path;

struct CategoryRule {
    category: &'static str,
    extensions: &'static [&'static str],
}

const CATEGORIES: [CategoryRule; 6] = [
    CategoryRule {
        category: "pdf",
        extensions: &["pdf"],
    },
    CategoryRule {
        category: "document",
        extensions: &["doc", "docx", "txt", "rtf", "md", "markdown"],
    },
    CategoryRule {
        category: "presentation",
        extensions: &["ppt", "pptx"],
    },
    CategoryRule {
        category: "spreadsheet",
        extensions: &["xls", "xlsx", "csv"],
    },
    CategoryRule {
        category: "structured",
        extensions: &["json"],
    },
    CategoryRule {
        category: "web",
        extensions: &["html", "htm"],
    },
];

/// Extensions `FileExtractor` has a reader for.
const EXTRACTABLE: &[&str] = &["txt", "md", "markdown", "html", "htm", "json", "csv"];

/// Why a file found on disk is left out of ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unsupported,
    TooLarge { size: u64, limit: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unsupported => write!(f, "no extractor for this file type"),
            Rejection::TooLarge { size, limit } => {
                write!(f, "{} bytes exceeds the {} byte limit", size, limit)
            }
        }
    }
}

pub struct FileClassifier;

impl FileClassifier {
    pub fn extension(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Category of a file, or `None` for unknown extensions.
    pub fn category(path: &Path) -> Option<&'static str> {
        let extension = Self::extension(path)?;
        CATEGORIES
            .iter()
            .find(|rule| rule.extensions.contains(&extension.as_str()))
            .map(|rule| rule.category)
    }

    /// Whether a file of this type can be turned into text or records.
    pub fn is_supported(path: &Path) -> bool {
        Self::extension(path).is_some_and(|e| EXTRACTABLE.contains(&e.as_str()))
    }

    /// Category of a file that may be ingested at `size` bytes.
    pub fn accepts(path: &Path, size: u64, max_bytes: u64) -> Result<&'static str, Rejection> {
        let category = Self::category(path)
            .filter(|_| Self::is_supported(path))
            .ok_or(Rejection::Unsupported)?;
        if size > max_bytes {
            return Err(Rejection::TooLarge {
                size,
                limit: max_bytes,
            });
        }
        Ok(category)
    }

    /// `*.ext` patterns match a file suffix; anything else matches a path
    /// fragment, with directories seen with a trailing `/`.
    pub fn matches_skip_pattern(relative: &Path, is_dir: bool, patterns: &[String]) -> bool {
        let mut text = relative.to_string_lossy().replace('\\', "/");
        if is_dir {
            text.push('/');
        }

        patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => !is_dir && text.ends_with(suffix),
            None => text.contains(pattern.as_str()),
        })
    }

    /// Human readable name: the file stem with separators turned into spaces.
    pub fn display_name(path: &Path) -> String {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.replace(['_', '-'], " ").trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "untitled".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_by_extension() {
        assert_eq!(FileClassifier::category(Path::new("a/QD-123.PDF")), Some("pdf"));
        assert_eq!(FileClassifier::category(Path::new("tkb.xlsx")), Some("spreadsheet"));
        assert_eq!(FileClassifier::category(Path::new("page.htm")), Some("web"));
        assert_eq!(FileClassifier::category(Path::new("notes.md")), Some("document"));
        assert_eq!(FileClassifier::category(Path::new("archive.zip")), None);
        assert_eq!(FileClassifier::category(Path::new("Makefile")), None);
    }

    #[test]
    fn test_accepts_only_extractable_files_within_limit() {
        assert_eq!(FileClassifier::accepts(Path::new("diem.csv"), 10, 100), Ok("spreadsheet"));
        assert_eq!(
            FileClassifier::accepts(Path::new("QD-123.pdf"), 10, 100),
            Err(Rejection::Unsupported)
        );
        assert_eq!(
            FileClassifier::accepts(Path::new("tkb.json"), 101, 100),
            Err(Rejection::TooLarge {
                size: 101,
                limit: 100
            })
        );
    }

    #[test]
    fn test_skip_patterns() {
        let patterns = vec!["*.zip".to_string(), ".git/".to_string()];

        assert!(FileClassifier::matches_skip_pattern(Path::new("test.zip"), false, &patterns));
        assert!(FileClassifier::matches_skip_pattern(Path::new("repo/.git"), true, &patterns));
        assert!(FileClassifier::matches_skip_pattern(Path::new("repo/.git/config"), false, &patterns));
        assert!(!FileClassifier::matches_skip_pattern(Path::new("backup.zip"), true, &patterns));
        assert!(!FileClassifier::matches_skip_pattern(Path::new("test.md"), false, &patterns));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            FileClassifier::display_name(Path::new("/tmp/thong_bao-hoc_phi.pdf")),
            "thong bao hoc phi"
        );
        assert_eq!(FileClassifier::display_name(Path::new("/tmp/.pdf")), ".pdf");
    }
}
