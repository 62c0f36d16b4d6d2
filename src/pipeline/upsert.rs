// file: src/pipeline/upsert.rs
// description: batched writes of chunks into the dense and sparse index with retries
// reference: coordinates concurrent writes with bounded retries per batch

use crate::config::{MAX_INDEX_BATCH_SIZE, UpsertConfig};
use crate::error::{IndexKind, PipelineError, Result};
use crate::index::SearchIndex;
use crate::models::Chunk;
use crate::pipeline::progress::ProgressTracker;
use crate::utils::retry::{RetryPolicy, with_timeout};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of writing one group to one index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexWrite {
    pub index: IndexKind,
    pub written: usize,
    pub error: Option<String>,
}

impl IndexWrite {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub group: usize,
    pub chunk_ids: Vec<String>,
    pub dense: IndexWrite,
    pub sparse: IndexWrite,
}

impl GroupOutcome {
    /// Both views hold the group.
    pub fn is_committed(&self) -> bool {
        self.dense.succeeded() && self.sparse.succeeded()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub namespace: String,
    pub groups: Vec<GroupOutcome>,
    pub dense_count: usize,
    pub sparse_count: usize,
}

impl UpsertReport {
    pub fn total_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn failed_groups(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_committed()).count()
    }

    pub fn is_fully_committed(&self) -> bool {
        self.failed_groups() == 0
    }

    pub fn failed_chunk_ids(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| !g.is_committed())
            .flat_map(|g| g.chunk_ids.iter().cloned())
            .collect()
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.chunk_ids.len()).collect()
    }
}

pub struct DualIndexUpserter {
    dense: Arc<dyn SearchIndex>,
    sparse: Arc<dyn SearchIndex>,
    batch_size: usize,
    policy: RetryPolicy,
    call_timeout: Duration,
    parallel_groups: usize,
}

impl DualIndexUpserter {
    pub fn new(
        dense: Arc<dyn SearchIndex>,
        sparse: Arc<dyn SearchIndex>,
        config: &UpsertConfig,
        call_timeout: Duration,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            dense,
            sparse,
            batch_size: config.batch_size,
            policy: RetryPolicy::for_upsert(config),
            call_timeout,
            parallel_groups: 1,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Groups are independent, so more than one may be in flight.
    pub fn with_parallel_groups(mut self, parallel_groups: usize) -> Self {
        self.parallel_groups = parallel_groups.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 || batch_size > MAX_INDEX_BATCH_SIZE {
            return Err(PipelineError::Validation(format!(
                "batch_size must be between 1 and {}",
                MAX_INDEX_BATCH_SIZE
            )));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Writes every chunk to both indexes, `batch_size` chunks per request.
    ///
    /// Never fails as a whole: each group's outcome is in the report.
    /// Re-running with the same chunks overwrites the same ids.
    pub async fn upsert_batch(
        &self,
        chunks: &[Chunk],
        namespace: &str,
        progress: Option<&ProgressTracker>,
    ) -> UpsertReport {
        let groups: Vec<&[Chunk]> = chunks.chunks(self.batch_size).collect();
        info!(
            "Upserting {} chunks in {} batches to namespace '{}'",
            chunks.len(),
            groups.len(),
            namespace
        );

        // futures are built up front so the stream holds no borrowing closure
        let pending: Vec<_> = groups
            .into_iter()
            .enumerate()
            .map(|(group, slice)| self.upsert_tracked(group, slice, namespace, progress))
            .collect();
        let outcomes: Vec<GroupOutcome> = stream::iter(pending)
            .buffered(self.parallel_groups)
            .collect()
            .await;

        let report = UpsertReport {
            namespace: namespace.to_string(),
            dense_count: outcomes.iter().map(|g| g.dense.written).sum(),
            sparse_count: outcomes.iter().map(|g| g.sparse.written).sum(),
            groups: outcomes,
        };

        if report.is_fully_committed() {
            info!(
                "Upsert complete: {} dense, {} sparse records",
                report.dense_count, report.sparse_count
            );
        } else {
            warn!(
                "Upsert finished with {} of {} batches failed",
                report.failed_groups(),
                report.total_groups()
            );
        }

        report
    }

    async fn upsert_tracked(
        &self,
        group: usize,
        chunks: &[Chunk],
        namespace: &str,
        progress: Option<&ProgressTracker>,
    ) -> GroupOutcome {
        let outcome = self.upsert_group(group, chunks, namespace).await;
        if let Some(progress) = progress {
            if outcome.is_committed() {
                progress.inc_group_committed(chunks.len());
            } else {
                progress.inc_group_failed();
            }
        }
        outcome
    }

    async fn upsert_group(&self, group: usize, chunks: &[Chunk], namespace: &str) -> GroupOutcome {
        debug!("Dispatching batch {} ({} chunks)", group, chunks.len());

        let (dense, sparse) = tokio::join!(
            self.write(self.dense.as_ref(), group, chunks, namespace),
            self.write(self.sparse.as_ref(), group, chunks, namespace),
        );

        GroupOutcome {
            group,
            chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            dense,
            sparse,
        }
    }

    async fn write(
        &self,
        index: &dyn SearchIndex,
        group: usize,
        chunks: &[Chunk],
        namespace: &str,
    ) -> IndexWrite {
        let label = format!("{} upsert batch {}", index.kind(), group);

        let result = self
            .policy
            .run(&label, |attempt| {
                with_timeout(
                    &label,
                    self.call_timeout,
                    index.upsert(namespace, chunks, attempt.mode),
                )
            })
            .await;

        match result {
            Ok(written) => IndexWrite {
                index: index.kind(),
                written,
                error: None,
            },
            Err(e) => {
                warn!("{} failed: {}", label, e);
                IndexWrite {
                    index: index.kind(),
                    written: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
