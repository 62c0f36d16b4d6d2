// file: src/retrieval/mod.rs
// description: query normalization, hybrid search and reranking
// reference: internal module structure

pub mod filters;
pub mod merge;
pub mod normalizer;
pub mod orchestrator;

pub use filters::{MetadataFilter, infer_filters};
pub use merge::merge_and_deduplicate;
pub use normalizer::{NormalizedQuery, QueryNormalizer, QueryToken, TokenKind};
pub use orchestrator::{HybridRetriever, IndexOutcome, QueryDiagnostics};
