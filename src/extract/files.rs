// file: src/extract/files.rs
// description: format dispatch producing text and record sets from a file on disk
// reference: extension-based extraction adapters

use crate::chunker::records::{Record, RecordSet};
use crate::error::{PipelineError, Result};
use crate::extract::classifier::FileClassifier;
use crate::extract::html::html_to_text;
use crate::extract::markdown::MarkdownExtractor;
use crate::extract::patterns::clean_text;
use crate::extract::{Extracted, Extractor};
use crate::models::MetadataValue;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub struct FileExtractor {
    markdown: MarkdownExtractor,
}

impl FileExtractor {
    pub fn new() -> Self {
        Self {
            markdown: MarkdownExtractor::new(),
        }
    }

    fn read_text(path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("{} is not valid UTF-8, decoding lossily", path.display());
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        })
    }

    /// Arrays of objects become record sets; malformed units are skipped.
    fn extract_json(path: &Path, content: &str) -> Result<Extracted> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| PipelineError::extraction(path, format!("invalid JSON: {}", e)))?;

        let stem = FileClassifier::display_name(path);
        let mut extracted = Extracted::default();

        match value {
            Value::Array(items) => {
                extracted.tables.push(records_from_array(&stem, items, &mut extracted.skipped));
            }
            Value::Object(object) => {
                for (name, value) in object {
                    match value {
                        Value::Array(items) => {
                            extracted
                                .tables
                                .push(records_from_array(&name, items, &mut extracted.skipped));
                        }
                        Value::String(text) => {
                            extracted.text.push_str(&text);
                            extracted.text.push_str("\n\n");
                        }
                        _ => {
                            warn!("Skipping unsupported JSON section '{}' in {}", name, path.display());
                            extracted.skipped.push(name);
                        }
                    }
                }
            }
            _ => {
                return Err(PipelineError::extraction(
                    path,
                    "expected a JSON array or object at the top level",
                ));
            }
        }

        extracted.tables.retain(|set| !set.records.is_empty());
        extracted.text = clean_text(&extracted.text);
        Ok(extracted)
    }

    /// The header row names the fields; rows that fail to parse are skipped.
    fn extract_csv(path: &Path, content: &str) -> Result<Extracted> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::extraction(path, format!("invalid CSV header: {}", e)))?
            .clone();

        let name = FileClassifier::display_name(path);
        let mut extracted = Extracted::default();
        let mut records = Vec::new();

        for (i, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!("Skipping CSV row {} of '{}': {}", i, name, e);
                    extracted.skipped.push(format!("{}[{}]", name, i));
                    continue;
                }
            };

            let record = headers.iter().zip(row.iter()).fold(Record::new(), |record, (field, value)| {
                let value = value.trim();
                record.with_field(
                    field.trim(),
                    (!value.is_empty()).then(|| MetadataValue::parse_loose(value)),
                )
            });
            records.push(record);
        }

        if !records.is_empty() {
            extracted.tables.push(RecordSet { name, records });
        }
        Ok(extracted)
    }
}

fn records_from_array(name: &str, items: Vec<Value>, skipped: &mut Vec<String>) -> RecordSet {
    let mut records = Vec::with_capacity(items.len());

    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(object) if !object.is_empty() => {
                records.push(Record::from_json_object(&object));
            }
            _ => {
                debug!("Skipping non-object row {} in record set '{}'", i, name);
                skipped.push(format!("{}[{}]", name, i));
            }
        }
    }

    RecordSet {
        name: name.to_string(),
        records,
    }
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for FileExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted> {
        let extension = FileClassifier::extension(path).unwrap_or_default();

        let extracted = match extension.as_str() {
            "txt" => Extracted::text(clean_text(&Self::read_text(path)?)),
            "md" | "markdown" => {
                let content = Self::read_text(path)?;
                Extracted::text(clean_text(&self.markdown.to_plain_text(&content)))
            }
            "html" | "htm" => Extracted::text(clean_text(&html_to_text(&Self::read_text(path)?))),
            "json" => Self::extract_json(path, &Self::read_text(path)?)?,
            "csv" => Self::extract_csv(path, &Self::read_text(path)?)?,
            other => {
                return Err(PipelineError::extraction(
                    path,
                    format!("unsupported file type '{}'", other),
                ));
            }
        };

        if !extracted.skipped.is_empty() {
            warn!(
                "Skipped {} malformed units while extracting {}",
                extracted.skipped.len(),
                path.display()
            );
        }

        Ok(extracted)
    }
}
