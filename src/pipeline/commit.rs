// file: src/pipeline/commit.rs
// description: makes a document visible only when both indexes hold all of its chunks
// reference: pending record, upsert, then commit or roll back

use crate::config::IdScheme;
use crate::error::{PipelineError, Result};
use crate::identity::{PointRange, chunk_ids, chunk_ids_for};
use crate::index::SearchIndex;
use crate::models::DocumentRecord;
use crate::pipeline::upsert::UpsertReport;
use crate::store::MetadataStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

pub struct CommitCoordinator {
    store: Arc<dyn MetadataStore>,
    dense: Arc<dyn SearchIndex>,
    sparse: Arc<dyn SearchIndex>,
    scheme: IdScheme,
    namespace_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CommitCoordinator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        dense: Arc<dyn SearchIndex>,
        sparse: Arc<dyn SearchIndex>,
        scheme: IdScheme,
    ) -> Self {
        Self {
            store,
            dense,
            sparse,
            scheme,
            namespace_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheme(&self) -> IdScheme {
        self.scheme
    }

    /// Serializes point allocation and rollback within one namespace.
    pub async fn lock_namespace(&self, namespace: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.namespace_locks.lock().await;
            locks.entry(namespace.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Commits the pending record if every group landed in both indexes.
    ///
    /// Otherwise the chunks that did land are purged and the record is
    /// removed, so the caller sees one `PartialCommit` failure.
    pub async fn finalize(
        &self,
        record: &DocumentRecord,
        report: &UpsertReport,
    ) -> Result<DocumentRecord> {
        let written: usize = report.group_sizes().iter().sum();

        if report.is_fully_committed() && written == record.total_chunks {
            let committed = self.store.commit_document(&record.document_id).await?;
            info!(
                "Committed document {} ({} chunks, points {}..={})",
                committed.document_id,
                committed.total_chunks,
                committed.point_start,
                committed.point_end
            );
            return Ok(committed);
        }

        warn!(
            "Rolling back document {}: {} of {} batches failed",
            record.document_id,
            report.failed_groups(),
            report.total_groups()
        );

        self.rollback(record).await;

        Err(PipelineError::PartialCommit {
            document_id: record.document_id.clone(),
            failed_groups: report.failed_groups(),
            total_groups: report.total_groups(),
        })
    }

    /// Best effort: chunks go first, then the record. A record whose chunks
    /// could not be purged stays pending, is never visible to duplicate
    /// lookups, and `delete` retries the purge.
    pub async fn rollback(&self, record: &DocumentRecord) {
        let _guard = self.lock_namespace(&record.namespace).await;

        if let Err(e) = self
            .delete_chunks(&record.namespace, &chunk_ids_for(self.scheme, record))
            .await
        {
            warn!(
                "Rolled back document {} left pending, its chunks could not be purged: {}",
                record.document_id, e
            );
            return;
        }

        if let Err(e) = self.store.delete_document(&record.document_id).await {
            warn!(
                "Failed to remove pending record {}: {}",
                record.document_id, e
            );
        }
    }

    /// Deletes a committed document: chunks from both indexes first, then the record.
    ///
    /// The record survives a failed chunk delete so the purge can be retried.
    pub async fn purge_document(&self, record: &DocumentRecord) -> Result<()> {
        let ids = chunk_ids_for(self.scheme, record);
        self.delete_chunks(&record.namespace, &ids).await?;
        self.store.delete_document(&record.document_id).await?;

        info!(
            "Deleted document {} and {} chunks from namespace '{}'",
            record.document_id,
            ids.len(),
            record.namespace
        );
        Ok(())
    }

    /// Removes chunks of a document whose record no longer exists.
    ///
    /// Refuses while the record exists, and under point ids refuses a range
    /// that overlaps any registered document.
    pub async fn purge_orphans(
        &self,
        namespace: &str,
        document_id: &str,
        point_start: u64,
        total_chunks: usize,
    ) -> Result<()> {
        let _guard = self.lock_namespace(namespace).await;

        if self.store.find_document_by_id(document_id).await?.is_some() {
            return Err(PipelineError::Validation(format!(
                "document {} still exists, delete it instead",
                document_id
            )));
        }

        if self.scheme == IdScheme::Point && total_chunks > 0 {
            let range = PointRange::allocate(point_start, total_chunks);
            let documents = self.store.list_documents(namespace).await?;
            if let Some(owner) = documents.iter().find(|r| {
                range.overlaps(&PointRange {
                    start: r.point_start,
                    end: r.point_end,
                })
            }) {
                return Err(PipelineError::Validation(format!(
                    "points {}..={} overlap document {} ({}..={})",
                    range.start, range.end, owner.document_id, owner.point_start, owner.point_end
                )));
            }
        }

        let ids = chunk_ids(self.scheme, document_id, point_start, total_chunks);
        debug!("Purging {} chunk ids of {}", ids.len(), document_id);
        self.delete_chunks(namespace, &ids).await
    }

    async fn delete_chunks(&self, namespace: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let (dense, sparse) = tokio::join!(
            self.dense.delete(namespace, ids),
            self.sparse.delete(namespace, ids),
        );
        dense?;
        sparse?;
        Ok(())
    }
}
