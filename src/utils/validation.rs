// file: src/utils/validation.rs
// description: input validation for paths, namespaces, queries and cli pairs
// reference: input validation patterns

use crate::config::MAX_INDEX_BATCH_SIZE;
use crate::error::{PipelineError, Result};
use crate::extract::FileClassifier;
use crate::models::MetadataValue;
use std::fs;
use std::path::Path;

pub struct Validator;

impl Validator {
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            PipelineError::Validation(format!(
                "Cannot canonicalize path {}: {}",
                path.display(),
                e
            ))
        })?;

        if !canonical.is_file() {
            return Err(PipelineError::Validation(format!(
                "Path is not a file: {}",
                canonical.display()
            )));
        }

        Ok(())
    }

    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_supported_file(path: &Path) -> Result<()> {
        if FileClassifier::is_supported(path) {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "Unsupported file type: {}",
                path.display()
            )))
        }
    }

    /// Namespaces become a url path segment.
    pub fn validate_namespace(namespace: &str) -> Result<()> {
        if namespace.trim().is_empty() {
            return Err(PipelineError::Validation("Namespace is empty".to_string()));
        }
        if namespace.contains(['/', '?', '#']) || namespace.chars().any(char::is_whitespace) {
            return Err(PipelineError::Validation(format!(
                "Invalid namespace: {:?}",
                namespace
            )));
        }
        Ok(())
    }

    pub fn validate_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(PipelineError::Validation("Query is empty".to_string()));
        }
        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PipelineError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    pub fn validate_batch_size(size: usize) -> Result<()> {
        if size == 0 {
            return Err(PipelineError::Validation(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if size > MAX_INDEX_BATCH_SIZE {
            return Err(PipelineError::Validation(format!(
                "Batch size too large (max {})",
                MAX_INDEX_BATCH_SIZE
            )));
        }

        Ok(())
    }

    /// Parses a `key=value` argument into a metadata entry.
    pub fn parse_key_value(pair: &str) -> Result<(String, MetadataValue)> {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            PipelineError::Validation(format!("Expected key=value, got {:?}", pair))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(PipelineError::Validation(format!(
                "Empty key in {:?}",
                pair
            )));
        }

        Ok((key.to_string(), MetadataValue::parse_loose(value.trim())))
    }

    /// Cuts at a character boundary, appending "..." when shortened.
    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            None => text.to_string(),
            Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_validate_file_path() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("thong_bao.txt");
        fs::write(&file_path, "test").unwrap();

        assert!(Validator::validate_file_path(&file_path).is_ok());
        assert!(Validator::validate_file_path(temp.path()).is_err());
        assert!(Validator::validate_file_path(Path::new("/nonexistent")).is_err());
    }

    #[test]
    fn test_validate_directory() {
        let temp = TempDir::new().unwrap();
        assert!(Validator::validate_directory(temp.path()).is_ok());
        assert!(Validator::validate_directory(Path::new("/nonexistent")).is_err());
    }

    #[test]
    fn test_validate_supported_file() {
        assert!(Validator::validate_supported_file(Path::new("diem_thi.csv")).is_ok());
        assert!(Validator::validate_supported_file(Path::new("quyet_dinh.pdf")).is_err());
    }

    #[test]
    fn test_validate_namespace() {
        assert!(Validator::validate_namespace("default").is_ok());
        assert!(Validator::validate_namespace("khoa-cntt_2025").is_ok());
        assert!(Validator::validate_namespace("").is_err());
        assert!(Validator::validate_namespace("a/b").is_err());
        assert!(Validator::validate_namespace("two words").is_err());
    }

    #[test]
    fn test_validate_query() {
        assert!(Validator::validate_query("học phí").is_ok());
        assert!(Validator::validate_query(" \n\t").is_err());
    }

    #[test]
    fn test_validate_batch_size() {
        assert!(Validator::validate_batch_size(96).is_ok());
        assert!(Validator::validate_batch_size(0).is_err());
        assert!(Validator::validate_batch_size(97).is_err());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            Validator::parse_key_value("year=2025").unwrap(),
            ("year".to_string(), MetadataValue::Integer(2025))
        );
        assert_eq!(
            Validator::parse_key_value("department = ĐÀO TẠO").unwrap(),
            ("department".to_string(), MetadataValue::from("ĐÀO TẠO"))
        );
        assert!(Validator::parse_key_value("novalue").is_err());
        assert!(Validator::parse_key_value("=x").is_err());
    }

    #[test]
    fn test_truncate_text_is_char_safe() {
        assert_eq!(Validator::truncate_text("short", 10), "short");
        assert_eq!(Validator::truncate_text("học phí kỳ 1", 7), "học phí...");
    }
}
