// file: src/models/document.rs
// description: document registry record owning a contiguous range of chunks
// reference: internal data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    /// Registered while its chunks are being written; not visible to callers.
    Pending,
    Committed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub namespace: String,
    pub display_name: String,
    pub file_name: String,
    pub file_type: String,
    pub file_hash: String,
    pub file_size: u64,
    pub total_chunks: usize,
    pub point_start: u64,
    pub point_end: u64,
    pub state: DocumentState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub supersedes: Option<String>,
}

impl DocumentRecord {
    pub fn is_committed(&self) -> bool {
        self.state == DocumentState::Committed
    }

    /// Short hash stamped into chunk metadata.
    pub fn short_hash(&self) -> &str {
        let end = self.file_hash.len().min(16);
        &self.file_hash[..end]
    }

    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
pub(crate) fn sample_record(document_id: &str, point_start: u64, total_chunks: usize) -> DocumentRecord {
    DocumentRecord {
        document_id: document_id.to_string(),
        namespace: "default".to_string(),
        display_name: "Thông báo học phí".to_string(),
        file_name: "hoc_phi.txt".to_string(),
        file_type: "document".to_string(),
        file_hash: DocumentRecord::compute_hash(document_id.as_bytes()),
        file_size: 1024,
        total_chunks,
        point_start,
        point_end: point_start + total_chunks.saturating_sub(1) as u64,
        state: DocumentState::Pending,
        created_at: Utc::now(),
        supersedes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let hash1 = DocumentRecord::compute_hash(b"Test content");
        let hash2 = DocumentRecord::compute_hash(b"Test content");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_short_hash_and_state() {
        let record = sample_record("doc-1", 0, 3);
        assert_eq!(record.short_hash().len(), 16);
        assert!(record.file_hash.starts_with(record.short_hash()));
        assert!(!record.is_committed());
        assert_eq!(record.point_end, 2);
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = sample_record("doc-2", 10, 4);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"state\":\"pending\""));
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
