// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod chunk;
pub mod document;
pub mod search_result;

pub use chunk::{Chunk, Metadata, MetadataValue, metadata_from_json};
pub use document::{DocumentRecord, DocumentState};
pub use search_result::{MergedHit, RerankedHit, RetrievedChunk, SearchHit};
