// file: src/chunker/mod.rs
// description: chunking engine exports
// reference: internal module structure

pub mod builder;
pub mod records;
pub mod text_splitter;

pub use builder::{ChunkDraft, ContentType, DocumentChunker};
pub use records::{Record, RecordChunking, RecordSet, chunk_records, flatten_record};
pub use text_splitter::{TextSplitter, split_text};
