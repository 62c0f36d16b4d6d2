// file: src/pipeline/service.rs
// description: background ingestion acknowledged immediately with a status handle
// reference: bounded tokio tasks updating a key-scoped status store

use crate::pipeline::ingest::{IngestRequest, IngestionPipeline};
use crate::pipeline::status::{StatusEntry, StatusStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct IngestionService {
    pipeline: Arc<IngestionPipeline>,
    status: Arc<StatusStore>,
    permits: Arc<Semaphore>,
}

impl IngestionService {
    pub fn new(pipeline: Arc<IngestionPipeline>, status_ttl: Duration) -> Self {
        let permits = Arc::new(Semaphore::new(pipeline.max_concurrent_ingests()));
        Self {
            pipeline,
            status: Arc::new(StatusStore::new(status_ttl)),
            permits,
        }
    }

    /// Queues `path` for ingestion and returns its status handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, path: PathBuf, request: IngestRequest) -> String {
        let handle = Uuid::new_v4().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.status.start(&handle, &file_name);

        let pipeline = self.pipeline.clone();
        let status = self.status.clone();
        let permits = self.permits.clone();
        let task_handle = handle.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Ingestion queue closed: {}", e);
                    status.fail(&task_handle, "ingestion queue closed");
                    return;
                }
            };

            match pipeline.ingest_file(&path, request).await {
                Ok(outcome) => {
                    info!(
                        "Upload {} completed as document {}",
                        task_handle, outcome.document.document_id
                    );
                    status.complete(
                        &task_handle,
                        &outcome.document.document_id,
                        outcome.document.total_chunks,
                    );
                }
                Err(e) => {
                    warn!("Upload {} failed: {}", task_handle, e);
                    status.fail(&task_handle, &e.to_string());
                }
            }
        });

        handle
    }

    pub fn status(&self, handle: &str) -> Option<StatusEntry> {
        self.status.get(handle)
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{FailureKind, IndexKind};
    use crate::extract::FileExtractor;
    use crate::index::testing::MockIndex;
    use crate::pipeline::status::IngestState;
    use crate::store::JsonMetadataStore;
    use crate::utils::retry::RetryPolicy;
    use std::fs;
    use tempfile::TempDir;

    fn service(sparse: Arc<MockIndex>) -> IngestionService {
        let pipeline = IngestionPipeline::new(
            &Config::default_config(),
            Arc::new(FileExtractor::new()),
            Arc::new(JsonMetadataStore::in_memory()),
            Arc::new(MockIndex::new(IndexKind::Dense)),
            sparse,
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::no_delay(1));

        IngestionService::new(Arc::new(pipeline), Duration::from_secs(3600))
    }

    async fn wait_finished(service: &IngestionService, handle: &str) -> StatusEntry {
        for _ in 0..200 {
            if let Some(entry) = service.status(handle)
                && entry.state.is_finished()
            {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("upload {handle} did not finish");
    }

    #[tokio::test]
    async fn test_submit_reports_completion() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thong_bao.txt");
        fs::write(&path, "Thông báo lịch thi cuối kỳ học kỳ 1. ".repeat(40)).unwrap();

        let service = service(Arc::new(MockIndex::new(IndexKind::Sparse)));
        let handle = service.submit(path, IngestRequest::default());

        let entry = wait_finished(&service, &handle).await;
        match entry.state {
            IngestState::Completed { chunks, .. } => assert!(chunks > 0),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_reports_failure_reason() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thong_bao.txt");
        fs::write(&path, "Thông báo lịch thi cuối kỳ học kỳ 1. ".repeat(40)).unwrap();

        let sparse = Arc::new(MockIndex::new(IndexKind::Sparse));
        sparse.fail_next_upserts(100, FailureKind::Fatal);
        let service = service(sparse);
        let handle = service.submit(path, IngestRequest::default());

        let entry = wait_finished(&service, &handle).await;
        match entry.state {
            IngestState::Failed { reason } => assert!(reason.contains("Partial commit")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
