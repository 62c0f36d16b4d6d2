// file: src/pipeline/ingest.rs
// description: end-to-end document ingestion, update and deletion against both indexes
// reference: orchestrates extraction, chunking, upsert and commit per document

use crate::chunker::DocumentChunker;
use crate::config::{Config, IdScheme, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::extract::{Extractor, FileClassifier, FileScanner};
use crate::identity::PointRange;
use crate::index::{IndexStats, SearchIndex};
use crate::models::{DocumentRecord, DocumentState, Metadata};
use crate::pipeline::commit::CommitCoordinator;
use crate::pipeline::progress::{IngestStats, ProgressTracker};
use crate::pipeline::upsert::DualIndexUpserter;
use crate::store::MetadataStore;
use crate::utils::retry::RetryPolicy;
use crate::utils::telemetry::OperationTimer;
use crate::utils::validation::Validator;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Caller options for one upload.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Falls back to the configured namespace.
    pub namespace: Option<String>,
    /// Falls back to the file stem.
    pub display_name: Option<String>,
    /// Extra scalar metadata stamped on every chunk.
    pub metadata: Metadata,
    /// Ingest even when identical content is already committed.
    pub force: bool,
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document: DocumentRecord,
    pub dense_count: usize,
    pub sparse_count: usize,
    /// Extraction units left out of the document.
    pub skipped_units: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub dense_records: u64,
    pub sparse_records: u64,
    pub documents: usize,
    pub pending_documents: usize,
}

pub struct DirectoryReport {
    pub results: Vec<(PathBuf, Result<IngestOutcome>)>,
    pub stats: IngestStats,
}

pub struct IngestionPipeline {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn MetadataStore>,
    dense: Arc<dyn SearchIndex>,
    sparse: Arc<dyn SearchIndex>,
    chunker: DocumentChunker,
    upserter: DualIndexUpserter,
    coordinator: CommitCoordinator,
    scheme: IdScheme,
    default_namespace: String,
    min_content_chars: usize,
    pipeline_config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn MetadataStore>,
        dense: Arc<dyn SearchIndex>,
        sparse: Arc<dyn SearchIndex>,
    ) -> Result<Self> {
        config.validate()?;

        // a degraded call sends the batch as several sequential requests
        let sub_requests = config
            .upsert
            .batch_size
            .div_ceil(config.upsert.degraded_batch_size.max(1))
            .max(1) as u32;
        let call_timeout = Duration::from_secs(config.index.request_timeout_secs.max(1)) * sub_requests;

        let upserter =
            DualIndexUpserter::new(dense.clone(), sparse.clone(), &config.upsert, call_timeout)?;
        let coordinator = CommitCoordinator::new(
            store.clone(),
            dense.clone(),
            sparse.clone(),
            config.index.id_scheme,
        );

        Ok(Self {
            extractor,
            store,
            dense,
            sparse,
            chunker: DocumentChunker::new(&config.chunking)?,
            upserter,
            coordinator,
            scheme: config.index.id_scheme,
            default_namespace: config.index.namespace.clone(),
            min_content_chars: config.chunking.min_content_chars,
            pipeline_config: config.pipeline.clone(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.upserter = self.upserter.with_policy(policy);
        self
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn max_concurrent_ingests(&self) -> usize {
        self.pipeline_config.max_concurrent_ingests.max(1)
    }

    pub async fn ingest_file(&self, path: &Path, request: IngestRequest) -> Result<IngestOutcome> {
        self.ingest_file_with_progress(path, request, None).await
    }

    /// Extracts, chunks and writes one file; the document becomes visible
    /// only once every chunk is in both indexes.
    pub async fn ingest_file_with_progress(
        &self,
        path: &Path,
        request: IngestRequest,
        progress: Option<&ProgressTracker>,
    ) -> Result<IngestOutcome> {
        Validator::validate_file_path(path)?;
        Validator::validate_supported_file(path)?;

        let namespace = request
            .namespace
            .clone()
            .unwrap_or_else(|| self.default_namespace.clone());
        Validator::validate_namespace(&namespace)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let timer = OperationTimer::new(&format!("ingest {}", file_name));

        let bytes = tokio::fs::read(path).await?;
        let file_hash = DocumentRecord::compute_hash(&bytes);

        if !request.force
            && let Some(existing) = self.store.find_document_by_hash(&namespace, &file_hash).await?
        {
            info!(
                "{} matches committed document {}, skipping",
                file_name, existing.document_id
            );
            return Err(PipelineError::DuplicateDocument {
                file_name,
                document_id: existing.document_id,
            });
        }

        let extractor = self.extractor.clone();
        let owned_path = path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&owned_path))
            .await
            .map_err(|e| PipelineError::extraction(path, format!("extraction task failed: {}", e)))??;

        let content_chars = extracted.content_chars();
        if content_chars < self.min_content_chars {
            return Err(PipelineError::Validation(format!(
                "{} has {} characters of content, at least {} required",
                file_name, content_chars, self.min_content_chars
            )));
        }

        let drafts = self.chunker.draft(&extracted);
        if drafts.is_empty() {
            return Err(PipelineError::Validation(format!(
                "{} produced no chunks",
                file_name
            )));
        }

        let record = self
            .reserve(
                &namespace,
                DocumentRecord {
                    document_id: Uuid::new_v4().to_string(),
                    namespace: namespace.clone(),
                    display_name: request
                        .display_name
                        .clone()
                        .unwrap_or_else(|| FileClassifier::display_name(path)),
                    file_name,
                    file_type: FileClassifier::category(path).unwrap_or("text").to_string(),
                    file_hash,
                    file_size: bytes.len() as u64,
                    total_chunks: drafts.len(),
                    point_start: 0,
                    point_end: 0,
                    state: DocumentState::Pending,
                    created_at: Utc::now(),
                    supersedes: request.supersedes.clone(),
                },
            )
            .await?;

        let chunks = self
            .chunker
            .assemble(drafts, &record, self.scheme, &request.metadata);
        timer.checkpoint(&format!("{} chunks prepared", chunks.len()));

        let report = self.upserter.upsert_batch(&chunks, &namespace, progress).await;
        let document = self.coordinator.finalize(&record, &report).await?;

        timer.finish_with_count(chunks.len());

        Ok(IngestOutcome {
            document,
            dense_count: report.dense_count,
            sparse_count: report.sparse_count,
            skipped_units: extracted.skipped.len(),
        })
    }

    /// Allocates a point range and registers the pending record.
    ///
    /// Serialized per namespace with rollbacks so concurrent uploads never share ids.
    async fn reserve(&self, namespace: &str, mut record: DocumentRecord) -> Result<DocumentRecord> {
        let _guard = self.coordinator.lock_namespace(namespace).await;

        let next = self.store.next_available_point_id(namespace).await?;
        let range = PointRange::allocate(next, record.total_chunks);
        record.point_start = range.start;
        record.point_end = range.end;

        self.store.create_document(record.clone()).await?;
        debug!(
            "Reserved points {}..={} for document {}",
            range.start, range.end, record.document_id
        );
        Ok(record)
    }

    /// Re-uploads a document: the new content is committed under a new id
    /// and point range before the old one is removed.
    pub async fn update_document(
        &self,
        document_id: &str,
        path: &Path,
        metadata: Metadata,
    ) -> Result<IngestOutcome> {
        let old = self
            .store
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {}", document_id)))?;

        let request = IngestRequest {
            namespace: Some(old.namespace.clone()),
            display_name: Some(old.display_name.clone()),
            metadata,
            force: true,
            supersedes: Some(old.document_id.clone()),
        };

        let outcome = self.ingest_file(path, request).await?;

        if let Err(e) = self.coordinator.purge_document(&old).await {
            warn!(
                "Document {} replaced by {} but could not be removed: {}",
                old.document_id, outcome.document.document_id, e
            );
        }

        info!(
            "Document {} superseded by {}",
            old.document_id, outcome.document.document_id
        );
        Ok(outcome)
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<DocumentRecord> {
        let record = self
            .store
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {}", document_id)))?;

        self.coordinator.purge_document(&record).await?;
        Ok(record)
    }

    /// Removes chunks left behind by a rolled back document.
    pub async fn purge_orphans(
        &self,
        namespace: &str,
        document_id: &str,
        point_start: u64,
        total_chunks: usize,
    ) -> Result<()> {
        self.coordinator
            .purge_orphans(namespace, document_id, point_start, total_chunks)
            .await
    }

    pub async fn list_documents(&self, namespace: &str) -> Result<Vec<DocumentRecord>> {
        self.store.list_documents(namespace).await
    }

    pub async fn stats(&self, namespace: &str) -> Result<NamespaceStats> {
        let (dense, sparse): (Result<IndexStats>, Result<IndexStats>) = tokio::join!(
            self.dense.describe(namespace),
            self.sparse.describe(namespace)
        );
        let documents = self.store.list_documents(namespace).await?;
        let pending_documents = documents.iter().filter(|d| !d.is_committed()).count();

        Ok(NamespaceStats {
            namespace: namespace.to_string(),
            dense_records: dense?.record_count,
            sparse_records: sparse?.record_count,
            documents: documents.len() - pending_documents,
            pending_documents,
        })
    }

    /// Ingests every supported file under `root`, `max_concurrent_ingests` at a time.
    pub async fn ingest_directory(
        &self,
        root: &Path,
        request: IngestRequest,
        progress: &ProgressTracker,
    ) -> Result<DirectoryReport> {
        Validator::validate_directory(root)?;

        let pipeline_config = self.pipeline_config.clone();
        let owned_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            FileScanner::new(pipeline_config).scan_directory(&owned_root)
        })
        .await
        .map_err(|e| PipelineError::Validation(format!("File scanning task failed: {}", e)))??;

        if files.is_empty() {
            warn!("No ingestible files found under {}", root.display());
        }
        progress.set_total(files.len());

        let force = request.force || self.pipeline_config.force_reprocess;
        let tasks: Vec<_> = files.into_iter().map(|file| {
            let request = IngestRequest {
                display_name: None,
                force,
                ..request.clone()
            };

            async move {
                progress.set_message(file.relative_path.clone());
                let result = self
                    .ingest_file_with_progress(&file.path, request, Some(progress))
                    .await;

                match &result {
                    Ok(_) => {
                        progress.add_bytes_processed(file.size);
                        progress.inc_files_ingested();
                    }
                    Err(e) if e.is_duplicate() => progress.inc_files_skipped(),
                    Err(e) => {
                        warn!("Failed to ingest {}: {}", file.relative_path, e);
                        progress.inc_files_failed();
                    }
                }

                (file.path, result)
            }
        })
        .collect();

        let results: Vec<(PathBuf, Result<IngestOutcome>)> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent_ingests())
            .collect()
            .await;

        let stats = progress.get_stats();
        log_final_stats(&stats);

        Ok(DirectoryReport { results, stats })
    }
}

fn log_final_stats(stats: &IngestStats) {
    info!("=== Ingestion Summary ===");
    info!("Duration: {} seconds", stats.duration_secs);
    info!("Files ingested: {}", stats.files_ingested);
    info!("Files failed: {}", stats.files_failed);
    info!("Duplicates skipped: {}", stats.files_skipped);
    info!("Success rate: {:.2}%", stats.success_rate());
    info!("Chunks written: {}", stats.chunks_written);
    info!("Failed batches: {}", stats.batches_failed);
    info!("Throughput: {:.2} chunks/sec", stats.chunks_per_second());
    info!("=========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, IndexKind};
    use crate::extract::FileExtractor;
    use crate::index::testing::MockIndex;
    use crate::store::JsonMetadataStore;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        store: Arc<JsonMetadataStore>,
        dense: Arc<MockIndex>,
        sparse: Arc<MockIndex>,
        pipeline: IngestionPipeline,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_scheme(IdScheme::Named)
        }

        fn with_scheme(scheme: IdScheme) -> Self {
            let mut config = Config::default_config();
            config.index.id_scheme = scheme;

            let store = Arc::new(JsonMetadataStore::in_memory());
            let dense = Arc::new(MockIndex::new(IndexKind::Dense));
            let sparse = Arc::new(MockIndex::new(IndexKind::Sparse));
            let pipeline = IngestionPipeline::new(
                &config,
                Arc::new(FileExtractor::new()),
                store.clone(),
                dense.clone(),
                sparse.clone(),
            )
            .unwrap()
            .with_retry_policy(RetryPolicy::no_delay(2));

            Self {
                dir: TempDir::new().unwrap(),
                store,
                dense,
                sparse,
                pipeline,
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    fn notice(topic: &str) -> String {
        format!("Thông báo về {} học kỳ 1 năm học 2025. ", topic).repeat(50)
    }

    #[tokio::test]
    async fn test_ingest_commits_document_and_chunks() {
        let h = Harness::new();
        let path = h.file("hoc_phi.txt", &notice("học phí"));

        let outcome = h.pipeline.ingest_file(&path, IngestRequest::default()).await.unwrap();

        let document = &outcome.document;
        assert!(document.is_committed());
        assert_eq!(document.point_start, 0);
        assert_eq!(document.point_end, document.total_chunks as u64 - 1);
        assert_eq!(document.display_name, "hoc phi");
        assert_eq!(h.dense.stored_ids("default").len(), document.total_chunks);
        assert_eq!(h.sparse.stored_ids("default").len(), document.total_chunks);
        assert_eq!(outcome.dense_count, document.total_chunks);
    }

    #[tokio::test]
    async fn test_failed_batches_leave_no_document() {
        let h = Harness::new();
        h.sparse.fail_next_upserts(100, FailureKind::Fatal);
        let path = h.file("lich_thi.txt", &notice("lịch thi"));

        let err = h
            .pipeline
            .ingest_file(&path, IngestRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PartialCommit { .. }));
        assert!(h.store.list_documents("default").await.unwrap().is_empty());
        assert!(h.dense.stored_ids("default").is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rejected_unless_forced() {
        let h = Harness::new();
        let path = h.file("quy_che.txt", &notice("quy chế"));

        let first = h.pipeline.ingest_file(&path, IngestRequest::default()).await.unwrap();
        let err = h
            .pipeline
            .ingest_file(&path, IngestRequest::default())
            .await
            .unwrap_err();

        match err {
            PipelineError::DuplicateDocument { document_id, .. } => {
                assert_eq!(document_id, first.document.document_id)
            }
            other => panic!("expected duplicate, got {other}"),
        }

        let forced = IngestRequest {
            force: true,
            ..IngestRequest::default()
        };
        let second = h.pipeline.ingest_file(&path, forced).await.unwrap();
        assert_eq!(second.document.point_start, first.document.point_end + 1);
    }

    #[tokio::test]
    async fn test_too_little_content_is_validation_error() {
        let h = Harness::new();
        let path = h.file("empty.txt", "  ab  ");

        let err = h
            .pipeline
            .ingest_file(&path, IngestRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(h.dense.upsert_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_old_document() {
        let h = Harness::new();
        let old_path = h.file("hoc_bong.txt", &notice("học bổng"));
        let new_path = h.file("hoc_bong_v2.txt", &notice("học bổng đợt 2"));

        let old = h
            .pipeline
            .ingest_file(&old_path, IngestRequest::default())
            .await
            .unwrap()
            .document;

        let new = h
            .pipeline
            .update_document(&old.document_id, &new_path, Metadata::new())
            .await
            .unwrap()
            .document;

        assert_ne!(new.document_id, old.document_id);
        assert_eq!(new.supersedes.as_deref(), Some(old.document_id.as_str()));
        assert_eq!(new.point_start, old.point_end + 1);
        assert!(h.store.find_document_by_id(&old.document_id).await.unwrap().is_none());

        let stored = h.dense.stored_ids("default");
        assert_eq!(stored.len(), new.total_chunks);
        assert!(stored.iter().all(|id| id.starts_with(&new.document_id)));
    }

    #[tokio::test]
    async fn test_delete_removes_chunks_and_record() {
        let h = Harness::new();
        let path = h.file("nghi_le.txt", &notice("nghỉ lễ"));
        let document = h
            .pipeline
            .ingest_file(&path, IngestRequest::default())
            .await
            .unwrap()
            .document;

        h.pipeline.delete_document(&document.document_id).await.unwrap();

        assert!(h.dense.stored_ids("default").is_empty());
        assert!(h.sparse.stored_ids("default").is_empty());
        assert!(matches!(
            h.pipeline.delete_document(&document.document_id).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ingests_get_disjoint_ranges() {
        let h = Harness::new();
        let a = h.file("a.txt", &notice("đăng ký học phần"));
        let b = h.file("b.txt", &notice("tốt nghiệp"));

        let (first, second) = tokio::join!(
            h.pipeline.ingest_file(&a, IngestRequest::default()),
            h.pipeline.ingest_file(&b, IngestRequest::default()),
        );
        let first = first.unwrap().document;
        let second = second.unwrap().document;

        let first_range = PointRange {
            start: first.point_start,
            end: first.point_end,
        };
        let second_range = PointRange {
            start: second.point_start,
            end: second.point_end,
        };
        assert!(!first_range.overlaps(&second_range));
    }

    #[tokio::test]
    async fn test_stats_and_directory_ingest() {
        let h = Harness::new();
        h.file("thong_bao_1.txt", &notice("lịch học"));
        h.file("thong_bao_2.md", &format!("# Lịch thi\n\n{}", notice("lịch thi")));
        h.file("anh.png", "not an image");

        let progress = ProgressTracker::hidden(2);
        let report = h
            .pipeline
            .ingest_directory(h.dir.path(), IngestRequest::default(), &progress)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(report.stats.files_ingested, 2);

        let stats = h.pipeline.stats("default").await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.pending_documents, 0);
        assert_eq!(stats.dense_records, stats.sparse_records);
        assert_eq!(stats.dense_records as usize, report.stats.chunks_written);
    }

    #[tokio::test]
    async fn test_rolled_back_points_are_never_reissued() {
        let h = Harness::with_scheme(IdScheme::Point);
        h.sparse.fail_next_upserts(1, FailureKind::Fatal);
        let a = h.file("hoc_bong.txt", &notice("học bổng"));
        let b = h.file("ky_luat.txt", &notice("kỷ luật"));

        let err = h
            .pipeline
            .ingest_file(&a, IngestRequest::default())
            .await
            .unwrap_err();
        let rolled_back = match err {
            PipelineError::PartialCommit { document_id, .. } => document_id,
            other => panic!("expected partial commit, got {other:?}"),
        };
        assert!(h.dense.stored_ids("default").is_empty());

        let committed = h
            .pipeline
            .ingest_file(&b, IngestRequest::default())
            .await
            .unwrap()
            .document;
        assert!(committed.point_start > 0);

        // the rolled back range lies entirely below the committed one
        h.pipeline
            .purge_orphans("default", &rolled_back, 0, committed.point_start as usize)
            .await
            .unwrap();
        assert_eq!(h.dense.stored_ids("default").len(), committed.total_chunks);
        assert_eq!(h.sparse.stored_ids("default").len(), committed.total_chunks);

        let err = h
            .pipeline
            .purge_orphans("default", &rolled_back, committed.point_start, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(h.dense.stored_ids("default").len(), committed.total_chunks);
    }

    #[tokio::test]
    async fn test_rollback_during_concurrent_ingest_spares_committed_chunks() {
        let h = Harness::with_scheme(IdScheme::Point);
        h.sparse.fail_next_upserts(1, FailureKind::Fatal);
        // equal length topics give equal chunk counts
        let a = h.file("ky_thi_1.txt", &notice("kỳ thi 1"));
        let b = h.file("ky_thi_2.txt", &notice("kỳ thi 2"));

        let (first, second) = tokio::join!(
            h.pipeline.ingest_file(&a, IngestRequest::default()),
            h.pipeline.ingest_file(&b, IngestRequest::default()),
        );
        let (committed, failed) = match (first, second) {
            (Ok(outcome), Err(e)) | (Err(e), Ok(outcome)) => (outcome.document, e),
            other => panic!("expected one commit and one rollback, got {other:?}"),
        };
        assert!(matches!(failed, PipelineError::PartialCommit { .. }));

        let expected: Vec<String> = (committed.point_start..=committed.point_end)
            .map(|p| p.to_string())
            .collect();
        let mut dense_ids = h.dense.stored_ids("default");
        dense_ids.sort_by_key(|id| id.parse::<u64>().unwrap());
        assert_eq!(dense_ids, expected);
        assert_eq!(h.sparse.stored_ids("default").len(), expected.len());

        let c = h.file("ky_thi_3.txt", &notice("kỳ thi 3"));
        let third = h
            .pipeline
            .ingest_file(&c, IngestRequest::default())
            .await
            .unwrap()
            .document;
        assert_eq!(third.point_start, 2 * committed.total_chunks as u64);
    }

    #[tokio::test]
    async fn test_ingest_runs_on_spawned_task() {
        let h = Harness::new();
        let path = h.file("hoc_phi.txt", &notice("học phí"));
        let pipeline = Arc::new(h.pipeline);

        let task = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.ingest_file(&path, IngestRequest::default()).await }
        });

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.document.is_committed());
        assert_eq!(h.dense.stored_ids("default").len(), outcome.document.total_chunks);
    }
}
