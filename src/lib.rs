// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod store;
pub mod utils;

pub use chunker::{DocumentChunker, TextSplitter};
pub use config::{
    ChunkingConfig, Config, IdScheme, IndexConfig, PipelineConfig, RecordStrategy,
    RetrievalConfig, StorageConfig, UpsertConfig,
};
pub use error::{FailureKind, IndexKind, PipelineError, Result};
pub use extract::{Extractor, FileExtractor, FileScanner};
pub use identity::PointRange;
pub use index::{PineconeIndexClient, PineconeReranker, Reranker, SearchIndex};
pub use models::{
    Chunk, DocumentRecord, DocumentState, Metadata, MetadataValue, RerankedHit, RetrievedChunk,
};
pub use pipeline::{
    IngestOutcome, IngestRequest, IngestStats, IngestionPipeline, IngestionService,
    ProgressTracker, UpsertReport,
};
pub use retrieval::{HybridRetriever, MetadataFilter, QueryDiagnostics, QueryNormalizer};
pub use store::{JsonMetadataStore, MetadataStore};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, RetryPolicy, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        let _normalizer = QueryNormalizer::default();
        let _chunker = DocumentChunker::new(&config.chunking).unwrap();
    }
}
