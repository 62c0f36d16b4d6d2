// file: src/identity.rs
// description: deterministic chunk identifiers shared by the dense and sparse index
// reference: chunk ids derived from document id and chunk index

use crate::config::IdScheme;
use crate::models::DocumentRecord;

/// Contiguous block of integer point ids owned by one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointRange {
    pub start: u64,
    pub end: u64,
}

impl PointRange {
    /// Allocates `total_chunks` ids starting at `next_available`.
    pub fn allocate(next_available: u64, total_chunks: usize) -> Self {
        let span = total_chunks.max(1) as u64;
        Self {
            start: next_available,
            end: next_available + span - 1,
        }
    }

    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn overlaps(&self, other: &PointRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Id of chunk `chunk_index` of a document.
pub fn chunk_id(scheme: IdScheme, document_id: &str, point_start: u64, chunk_index: usize) -> String {
    match scheme {
        IdScheme::Named => format!("{}_chunk_{}", document_id, chunk_index),
        IdScheme::Point => (point_start + chunk_index as u64).to_string(),
    }
}

/// Every chunk id a document record owns, in chunk order.
pub fn chunk_ids_for(scheme: IdScheme, record: &DocumentRecord) -> Vec<String> {
    chunk_ids(scheme, &record.document_id, record.point_start, record.total_chunks)
}

pub fn chunk_ids(
    scheme: IdScheme,
    document_id: &str,
    point_start: u64,
    total_chunks: usize,
) -> Vec<String> {
    (0..total_chunks)
        .map(|i| chunk_id(scheme, document_id, point_start, i))
        .collect()
}
