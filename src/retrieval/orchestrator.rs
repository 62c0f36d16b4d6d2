// file: src/retrieval/orchestrator.rs
// description: concurrent dense and sparse search, merge, and rerank with deterministic fallback
// reference: hybrid search with cross-encoder reranking

use crate::config::RetrievalConfig;
use crate::error::{FailureKind, IndexKind, PipelineError, Result};
use crate::index::{Reranker, SearchIndex};
use crate::models::{MergedHit, RerankedHit, RetrievedChunk, SearchHit};
use crate::retrieval::filters::{MetadataFilter, infer_filters};
use crate::retrieval::merge::merge_and_deduplicate;
use crate::retrieval::normalizer::QueryNormalizer;
use crate::utils::retry::{RetryPolicy, with_timeout};
use crate::utils::telemetry::OperationTimer;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one index search within a query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexOutcome {
    pub hits: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryDiagnostics {
    pub normalized_query: String,
    pub filter: Option<MetadataFilter>,
    pub dense: IndexOutcome,
    pub sparse: IndexOutcome,
    pub merged: usize,
    pub matched_by_both: usize,
    pub reranked: bool,
    pub rerank_error: Option<String>,
    pub elapsed_ms: u64,
}

impl QueryDiagnostics {
    fn new(normalized_query: String, filter: Option<MetadataFilter>) -> Self {
        Self {
            normalized_query,
            filter,
            dense: IndexOutcome::default(),
            sparse: IndexOutcome::default(),
            merged: 0,
            matched_by_both: 0,
            reranked: false,
            rerank_error: None,
            elapsed_ms: 0,
        }
    }

    /// Neither index answered.
    pub fn is_total_outage(&self) -> bool {
        self.dense.error.is_some() && self.sparse.error.is_some()
    }
}

pub struct HybridRetriever {
    dense: Arc<dyn SearchIndex>,
    sparse: Arc<dyn SearchIndex>,
    reranker: Arc<dyn Reranker>,
    normalizer: QueryNormalizer,
    config: RetrievalConfig,
    search_policy: RetryPolicy,
}

impl HybridRetriever {
    pub fn new(
        dense: Arc<dyn SearchIndex>,
        sparse: Arc<dyn SearchIndex>,
        reranker: Arc<dyn Reranker>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            dense,
            sparse,
            reranker,
            normalizer: QueryNormalizer::new(config.max_query_chars),
            search_policy: RetryPolicy::for_search(&config),
            config,
        })
    }

    pub fn with_search_policy(mut self, policy: RetryPolicy) -> Self {
        self.search_policy = policy;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        top_n: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RerankedHit>> {
        self.query_with_diagnostics(text, top_k, top_n, namespace, filter)
            .await
            .map(|(hits, _)| hits)
    }

    /// What the answer generator consumes: text, metadata and score, at most `top_n`.
    pub async fn retrieve(
        &self,
        text: &str,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let hits = self
            .query(text, self.config.top_k, self.config.top_n, namespace, filter)
            .await?;
        Ok(hits.into_iter().map(RetrievedChunk::from).collect())
    }

    /// Empty queries are rejected; index and reranker failures only degrade the result.
    pub async fn query_with_diagnostics(
        &self,
        text: &str,
        top_k: usize,
        top_n: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<(Vec<RerankedHit>, QueryDiagnostics)> {
        let normalized = self.normalizer.normalize(text)?;
        let timer = OperationTimer::new("hybrid query");

        let inferred = match filter {
            None if self.config.infer_filters => infer_filters(&normalized.text),
            _ => None,
        };
        let filter = filter.or(inferred.as_ref());
        if let Some(f) = filter {
            debug!("Applying metadata filter: {}", f.to_json());
        }

        let mut diagnostics = QueryDiagnostics::new(normalized.text.clone(), filter.cloned());

        if top_k == 0 || top_n == 0 {
            debug!("Nothing requested (top_k={}, top_n={})", top_k, top_n);
            diagnostics.elapsed_ms = timer.finish().as_millis() as u64;
            return Ok((Vec::new(), diagnostics));
        }

        let (dense, sparse) = tokio::join!(
            self.search(self.dense.as_ref(), &normalized.text, top_k, namespace, filter),
            self.search(self.sparse.as_ref(), &normalized.text, top_k, namespace, filter),
        );
        let dense = record_outcome(&mut diagnostics.dense, IndexKind::Dense, dense);
        let sparse = record_outcome(&mut diagnostics.sparse, IndexKind::Sparse, sparse);

        if diagnostics.is_total_outage() {
            warn!("Both indexes failed for namespace '{}'", namespace);
        }

        let merged = merge_and_deduplicate(dense, sparse);
        diagnostics.merged = merged.len();
        diagnostics.matched_by_both = merged.iter().filter(|h| h.matched_by_both()).count();

        if merged.is_empty() {
            diagnostics.elapsed_ms = timer.finish().as_millis() as u64;
            return Ok((Vec::new(), diagnostics));
        }

        let results = match self.rerank(&normalized.text, &merged, top_n).await {
            Ok(results) => {
                diagnostics.reranked = true;
                results
            }
            Err(e) => {
                warn!("Rerank failed, using provisional order: {}", e);
                diagnostics.rerank_error = Some(e.to_string());
                provisional_order(merged, top_n)
            }
        };

        timer.warn_if_slow(Duration::from_secs(self.config.search_timeout_secs), "hybrid query");
        diagnostics.elapsed_ms = timer.finish_with_count(results.len()).as_millis() as u64;

        info!(
            "Query returned {} results (dense {}, sparse {}, merged {}, both {})",
            results.len(),
            diagnostics.dense.hits,
            diagnostics.sparse.hits,
            diagnostics.merged,
            diagnostics.matched_by_both
        );

        Ok((results, diagnostics))
    }

    async fn search(
        &self,
        index: &dyn SearchIndex,
        query: &str,
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let label = format!("{} search", index.kind());
        let timeout = Duration::from_secs(self.config.search_timeout_secs.max(1));

        self.search_policy
            .run(&label, |_| {
                with_timeout(&label, timeout, index.search(namespace, query, top_k, filter))
            })
            .await
    }

    async fn rerank(&self, query: &str, merged: &[MergedHit], top_n: usize) -> Result<Vec<RerankedHit>> {
        let documents: Vec<String> = merged
            .iter()
            .map(|hit| hit.text.chars().take(self.config.rerank_max_chars).collect())
            .collect();

        let timeout = Duration::from_secs(self.config.rerank_timeout_secs.max(1));
        let scores = with_timeout(
            "rerank",
            timeout,
            self.reranker.rerank(query, &documents, top_n),
        )
        .await?;

        let mut results = Vec::with_capacity(scores.len().min(top_n));
        let mut emitted = HashSet::new();
        for score in scores {
            if results.len() >= top_n {
                break;
            }
            if !emitted.insert(score.index) {
                debug!("reranker repeated index {}, keeping first score", score.index);
                continue;
            }
            let hit = merged.get(score.index).ok_or_else(|| PipelineError::Rerank {
                kind: FailureKind::Fatal,
                message: format!(
                    "reranker returned index {} for {} documents",
                    score.index,
                    merged.len()
                ),
            })?;

            results.push(RerankedHit {
                score: score.score,
                hit: hit.clone(),
                reranked: true,
            });
        }

        Ok(results)
    }
}

fn record_outcome(
    outcome: &mut IndexOutcome,
    kind: IndexKind,
    result: Result<Vec<SearchHit>>,
) -> Vec<SearchHit> {
    match result {
        Ok(hits) => {
            outcome.hits = hits.len();
            hits
        }
        Err(e) => {
            warn!("{} search failed, continuing without it: {}", kind, e);
            outcome.error = Some(e.to_string());
            Vec::new()
        }
    }
}

/// Score-descending merge order cut to `top_n`.
fn provisional_order(merged: Vec<MergedHit>, top_n: usize) -> Vec<RerankedHit> {
    merged
        .into_iter()
        .take(top_n)
        .map(|hit| RerankedHit {
            score: hit.score,
            hit,
            reranked: false,
        })
        .collect()
}
