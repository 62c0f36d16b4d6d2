// file: src/index/mod.rs
// description: capability contracts for the dense index, sparse index and reranker
// reference: internal module structure

pub mod pinecone;
pub mod rerank;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::{IndexKind, Result};
use crate::models::{Chunk, SearchHit};
use crate::retrieval::filters::MetadataFilter;
use crate::utils::retry::ExecutionMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use pinecone::PineconeIndexClient;
pub use rerank::PineconeReranker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub index: IndexKind,
    pub namespace: String,
    pub record_count: u64,
}

/// A remote index that embeds text itself: text in, hits out.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    /// Writes chunks, overwriting any record with the same id. Returns records written.
    async fn upsert(&self, namespace: &str, chunks: &[Chunk], mode: ExecutionMode) -> Result<usize>;

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>>;

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()>;

    async fn describe(&self, namespace: &str) -> Result<IndexStats>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Position in the submitted document list.
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Scores `documents` against `query`, best first, at most `top_n` entries.
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>>;
}
