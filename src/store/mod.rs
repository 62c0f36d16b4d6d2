// file: src/store/mod.rs
// description: document registry contract and its json-file implementation
// reference: internal module structure

pub mod json_store;

use crate::error::Result;
use crate::models::DocumentRecord;
use async_trait::async_trait;

pub use json_store::JsonMetadataStore;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Registers a new record. Fails if the document id already exists.
    async fn create_document(&self, record: DocumentRecord) -> Result<()>;

    /// Marks a pending record committed, making it visible to lookups by hash.
    async fn commit_document(&self, document_id: &str) -> Result<DocumentRecord>;

    /// Removes a record. Returns the removed record if it existed.
    async fn delete_document(&self, document_id: &str) -> Result<Option<DocumentRecord>>;

    async fn find_document_by_id(&self, document_id: &str) -> Result<Option<DocumentRecord>>;

    /// Committed document in `namespace` with the given full content hash.
    async fn find_document_by_hash(
        &self,
        namespace: &str,
        file_hash: &str,
    ) -> Result<Option<DocumentRecord>>;

    async fn list_documents(&self, namespace: &str) -> Result<Vec<DocumentRecord>>;

    /// One past the highest point id ever allocated in `namespace`.
    ///
    /// Never decreases, so ids of deleted or rolled back records are not handed out again.
    async fn next_available_point_id(&self, namespace: &str) -> Result<u64>;
}
