// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: ingestion orchestration

pub mod commit;
pub mod ingest;
pub mod progress;
pub mod service;
pub mod status;
pub mod upsert;

pub use commit::CommitCoordinator;
pub use ingest::{DirectoryReport, IngestOutcome, IngestRequest, IngestionPipeline, NamespaceStats};
pub use progress::{IngestStats, ProgressTracker};
pub use service::IngestionService;
pub use status::{IngestState, StatusEntry, StatusStore};
pub use upsert::{DualIndexUpserter, GroupOutcome, IndexWrite, UpsertReport};
