// file: src/chunker/builder.rs
// description: turns extracted document content into identified chunks with flat metadata
// reference: document chunking with per-chunk provenance metadata

use crate::chunker::records::{RecordChunking, chunk_records, group_text};
use crate::chunker::text_splitter::TextSplitter;
use crate::config::{ChunkingConfig, IdScheme};
use crate::error::Result;
use crate::extract::Extracted;
use crate::identity::chunk_id;
use crate::models::{Chunk, DocumentRecord, Metadata, MetadataValue};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    TableRecord,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::TableRecord => "table_record",
        }
    }
}

/// Chunk text before the owning document has an id or point range.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub text: String,
    pub content_type: ContentType,
    pub record_set: Option<String>,
}

pub struct DocumentChunker {
    splitter: TextSplitter,
    record_chunking: RecordChunking,
    min_chunk_size: usize,
    max_chunk_size: usize,
}

impl DocumentChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap)?,
            record_chunking: RecordChunking::from_config(
                config.record_strategy,
                config.records_per_chunk,
            ),
            min_chunk_size: config.min_chunk_size,
            max_chunk_size: config.max_chunk_size,
        })
    }

    /// Table record groups come first, then text windows.
    pub fn draft(&self, extracted: &Extracted) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();

        for set in &extracted.tables {
            let groups = chunk_records(
                &set.records,
                self.record_chunking,
                self.min_chunk_size,
                self.max_chunk_size,
            );

            for group in groups {
                let text = group_text(group);
                if text.trim().is_empty() {
                    continue;
                }

                // oversized groups still respect the text window bound
                for piece in self.splitter.split(&text) {
                    drafts.push(ChunkDraft {
                        text: piece,
                        content_type: ContentType::TableRecord,
                        record_set: Some(set.name.clone()),
                    });
                }
            }
        }

        for piece in self.splitter.split(&extracted.text) {
            drafts.push(ChunkDraft {
                text: piece,
                content_type: ContentType::Text,
                record_set: None,
            });
        }

        debug!(
            "Drafted {} chunks ({} record sets, {} text chars)",
            drafts.len(),
            extracted.tables.len(),
            extracted.text.chars().count()
        );

        drafts
    }

    /// Assigns ids and metadata once the document record owns a point range.
    pub fn assemble(
        &self,
        drafts: Vec<ChunkDraft>,
        record: &DocumentRecord,
        scheme: IdScheme,
        extra: &Metadata,
    ) -> Vec<Chunk> {
        let total_chunks = drafts.len();
        let upload_date = record.created_at.format("%Y-%m-%d").to_string();

        drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                let mut metadata = extra.clone();
                metadata.insert("document_id".into(), record.document_id.clone().into());
                metadata.insert("source".into(), record.display_name.clone().into());
                metadata.insert("file_name".into(), record.file_name.clone().into());
                metadata.insert("document_type".into(), record.file_type.clone().into());
                metadata.insert("content_type".into(), draft.content_type.as_str().into());
                metadata.insert("chunk_index".into(), index.into());
                metadata.insert("total_chunks".into(), total_chunks.into());
                metadata.insert(
                    "point_id".into(),
                    MetadataValue::from(record.point_start + index as u64),
                );
                metadata.insert("upload_date".into(), upload_date.clone().into());
                metadata.insert("file_hash".into(), record.short_hash().into());
                if let Some(name) = draft.record_set {
                    metadata.insert("record_set".into(), name.into());
                }

                Chunk {
                    id: chunk_id(scheme, &record.document_id, record.point_start, index),
                    text: draft.text,
                    source_document_id: record.document_id.clone(),
                    chunk_index: index,
                    total_chunks,
                    metadata,
                }
            })
            .collect()
    }

    pub fn chunk_document(
        &self,
        extracted: &Extracted,
        record: &DocumentRecord,
        scheme: IdScheme,
        extra: &Metadata,
    ) -> Vec<Chunk> {
        let drafts = self.draft(extracted);
        self.assemble(drafts, record, scheme, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::records::{Record, RecordSet};
    use crate::config::Config;
    use crate::models::document::sample_record;
    use pretty_assertions::assert_eq;

    fn extracted() -> Extracted {
        let records = (0..3)
            .map(|i| {
                Record::new()
                    .with_field("Mã HP", Some(format!("IT{}", 3000 + i).into()))
                    .with_field("Phòng học", None)
            })
            .collect();

        Extracted {
            text: "Thông báo về việc đăng ký học phần học kỳ 2. ".repeat(60),
            tables: vec![RecordSet {
                name: "TKB".to_string(),
                records,
            }],
            skipped: Vec::new(),
        }
    }

    fn chunker() -> DocumentChunker {
        DocumentChunker::new(&Config::default_config().chunking).unwrap()
    }

    #[test]
    fn test_tables_precede_text() {
        let drafts = chunker().draft(&extracted());
        assert!(drafts.len() >= 3);
        assert_eq!(drafts[0].content_type, ContentType::TableRecord);
        assert_eq!(drafts[0].record_set.as_deref(), Some("TKB"));
        assert!(drafts[0].text.contains("Phòng học: "));
        assert!(drafts[1..].iter().all(|d| d.content_type == ContentType::Text));
    }

    #[test]
    fn test_chunk_ids_idempotent() {
        let record = sample_record("doc-42", 0, 0);
        let chunker = chunker();
        let first = chunker.chunk_document(&extracted(), &record, IdScheme::Named, &Metadata::new());
        let second = chunker.chunk_document(&extracted(), &record, IdScheme::Named, &Metadata::new());

        let ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let again: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, again);
        assert_eq!(ids[0], "doc-42_chunk_0");
    }

    #[test]
    fn test_metadata_is_flat_and_complete() {
        let record = sample_record("doc-7", 40, 0);
        let mut extra = Metadata::new();
        extra.insert("department".into(), "DAO TAO".into());
        extra.insert("chunk_index".into(), 999i64.into());

        let chunks = chunker().chunk_document(&extracted(), &record, IdScheme::Point, &extra);
        let total = chunks.len();
        let last = &chunks[total - 1];

        assert_eq!(last.id, (40 + total - 1).to_string());
        assert_eq!(last.metadata["chunk_index"], MetadataValue::Integer((total - 1) as i64));
        assert_eq!(last.metadata["total_chunks"], MetadataValue::Integer(total as i64));
        assert_eq!(last.metadata["department"], MetadataValue::from("DAO TAO"));
        assert_eq!(last.metadata["content_type"], MetadataValue::from("text"));
        assert_eq!(last.metadata["file_hash"].as_str().map(str::len), Some(16));
        assert!(last.metadata.contains_key("upload_date"));
        assert_eq!(last.total_chunks, total);
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        let drafts = chunker().draft(&Extracted::default());
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default_config().chunking;
        config.chunk_overlap = config.chunk_size;
        assert!(DocumentChunker::new(&config).is_err());
    }
}
