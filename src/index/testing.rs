// file: src/index/testing.rs
// description: in-memory index and reranker doubles with scripted failures
// reference: test support

use crate::error::{FailureKind, IndexKind, PipelineError, Result};
use crate::index::{IndexStats, RerankScore, Reranker, SearchIndex};
use crate::models::{Chunk, SearchHit};
use crate::retrieval::filters::MetadataFilter;
use crate::utils::retry::ExecutionMode;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct State {
    records: BTreeMap<(String, String), Chunk>,
    upsert_sizes: Vec<usize>,
    upsert_modes: Vec<ExecutionMode>,
    failing_ids: HashSet<String>,
    failure_kind: Option<FailureKind>,
    /// Fail this many upsert calls before succeeding.
    failures_remaining: usize,
    scripted_hits: Option<Vec<SearchHit>>,
    search_fails: bool,
    search_filters: Vec<Option<MetadataFilter>>,
    deleted: Vec<String>,
    delete_failures_remaining: usize,
}

pub struct MockIndex {
    kind: IndexKind,
    state: Mutex<State>,
    pub search_calls: AtomicUsize,
}

impl MockIndex {
    pub fn new(kind: IndexKind) -> Self {
        Self {
            kind,
            state: Mutex::new(State::default()),
            search_calls: AtomicUsize::new(0),
        }
    }

    /// Any upsert containing one of `ids` fails with `kind`.
    pub fn fail_upserts_containing(&self, ids: &[&str], kind: FailureKind) {
        let mut state = self.state.lock().unwrap();
        state.failing_ids.extend(ids.iter().map(|s| s.to_string()));
        state.failure_kind = Some(kind);
    }

    pub fn fail_next_upserts(&self, count: usize, kind: FailureKind) {
        let mut state = self.state.lock().unwrap();
        state.failures_remaining = count;
        state.failure_kind = Some(kind);
    }

    pub fn fail_next_deletes(&self, count: usize) {
        self.state.lock().unwrap().delete_failures_remaining = count;
    }

    pub fn script_hits(&self, hits: Vec<SearchHit>) {
        self.state.lock().unwrap().scripted_hits = Some(hits);
    }

    pub fn fail_searches(&self) {
        self.state.lock().unwrap().search_fails = true;
    }

    pub fn upsert_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().upsert_sizes.clone()
    }

    pub fn upsert_modes(&self) -> Vec<ExecutionMode> {
        self.state.lock().unwrap().upsert_modes.clone()
    }

    pub fn stored_ids(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn search_filters(&self) -> Vec<Option<MetadataFilter>> {
        self.state.lock().unwrap().search_filters.clone()
    }
}

#[async_trait]
impl SearchIndex for MockIndex {
    fn kind(&self) -> IndexKind {
        self.kind
    }

    async fn upsert(&self, namespace: &str, chunks: &[Chunk], mode: ExecutionMode) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.upsert_sizes.push(chunks.len());
        state.upsert_modes.push(mode);

        let kind = state.failure_kind.unwrap_or(FailureKind::Transient);
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(PipelineError::index(self.kind, kind, "scripted failure"));
        }

        if chunks.iter().any(|c| state.failing_ids.contains(&c.id)) {
            return Err(PipelineError::index(self.kind, kind, "scripted batch failure"));
        }

        for chunk in chunks {
            state
                .records
                .insert((namespace.to_string(), chunk.id.clone()), chunk.clone());
        }
        Ok(chunks.len())
    }

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.search_filters.push(filter.cloned());

        if state.search_fails {
            return Err(PipelineError::index(self.kind, FailureKind::Fatal, "search unavailable"));
        }

        if let Some(hits) = &state.scripted_hits {
            return Ok(hits.iter().take(top_k).cloned().collect());
        }

        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        let mut hits: Vec<SearchHit> = state
            .records
            .iter()
            .filter(|((ns, _), chunk)| {
                ns == namespace && filter.is_none_or(|f| f.matches(&chunk.metadata))
            })
            .filter_map(|(_, chunk)| {
                let text = chunk.text.to_lowercase();
                let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (matched > 0).then(|| SearchHit {
                    id: chunk.id.clone(),
                    score: matched as f32,
                    text: chunk.text.clone(),
                    fields: chunk.metadata.clone(),
                    index: self.kind,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.delete_failures_remaining > 0 {
            state.delete_failures_remaining -= 1;
            return Err(PipelineError::index(self.kind, FailureKind::Transient, "scripted delete failure"));
        }
        for id in ids {
            state.records.remove(&(namespace.to_string(), id.clone()));
            state.deleted.push(id.clone());
        }
        Ok(())
    }

    async fn describe(&self, namespace: &str) -> Result<IndexStats> {
        Ok(IndexStats {
            index: self.kind,
            namespace: namespace.to_string(),
            record_count: self.stored_ids(namespace).len() as u64,
        })
    }
}

/// Scores documents in reverse submission order unless told to fail or scripted.
pub struct MockReranker {
    fails: bool,
    scripted: Option<Vec<RerankScore>>,
    pub calls: AtomicUsize,
    pub last_documents: Mutex<Vec<String>>,
}

impl MockReranker {
    pub fn reversing() -> Self {
        Self {
            fails: false,
            scripted: None,
            calls: AtomicUsize::new(0),
            last_documents: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::reversing()
        }
    }

    /// Returns exactly these `(index, score)` pairs, however malformed.
    pub fn scripted(scores: &[(usize, f32)]) -> Self {
        Self {
            scripted: Some(
                scores
                    .iter()
                    .map(|&(index, score)| RerankScore { index, score })
                    .collect(),
            ),
            ..Self::reversing()
        }
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(&self, _query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_documents.lock().unwrap() = documents.to_vec();

        if self.fails {
            return Err(PipelineError::Rerank {
                kind: FailureKind::Transient,
                message: "reranker unavailable".to_string(),
            });
        }

        if let Some(scores) = &self.scripted {
            return Ok(scores.clone());
        }

        let count = documents.len();
        Ok((0..count)
            .rev()
            .enumerate()
            .map(|(rank, index)| RerankScore {
                index,
                score: 1.0 - rank as f32 / (count as f32 + 1.0),
            })
            .take(top_n)
            .collect())
    }
}

pub fn hit(id: &str, score: f32, index: IndexKind) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        score,
        text: format!("nội dung {}", id),
        fields: Default::default(),
        index,
    }
}
