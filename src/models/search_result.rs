// file: src/models/search_result.rs
// description: Search hits from each index, merged hits and reranked output
// reference: Used for hybrid search results

use crate::error::IndexKind;
use crate::models::chunk::Metadata;
use serde::{Deserialize, Serialize};

/// One raw result from a single index. Scores are index-native.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub fields: Metadata,
    pub index: IndexKind,
}

/// A hit surviving cross-index deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    pub id: String,
    /// Maximum score observed across both indexes.
    pub score: f32,
    pub text: String,
    pub fields: Metadata,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
}

impl MergedHit {
    pub fn from_hit(hit: SearchHit) -> Self {
        let (dense_score, sparse_score) = match hit.index {
            IndexKind::Dense => (Some(hit.score), None),
            IndexKind::Sparse => (None, Some(hit.score)),
        };

        Self {
            id: hit.id,
            score: hit.score,
            text: hit.text,
            fields: hit.fields,
            dense_score,
            sparse_score,
        }
    }

    pub fn matched_by_both(&self) -> bool {
        self.dense_score.is_some() && self.sparse_score.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedHit {
    pub score: f32,
    pub hit: MergedHit,
    /// False when the order came from the provisional merge sort.
    pub reranked: bool,
}

/// What the answer generator consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl From<RerankedHit> for RetrievedChunk {
    fn from(value: RerankedHit) -> Self {
        Self {
            text: value.hit.text,
            metadata: value.hit.fields,
            score: value.score,
        }
    }
}

impl RerankedHit {
    /// Format as a summary string for display
    pub fn format_summary(&self, max_content_chars: usize) -> String {
        let preview: String = self.hit.text.chars().take(max_content_chars).collect();
        let ellipsis = if self.hit.text.chars().count() > max_content_chars {
            "..."
        } else {
            ""
        };
        let source = self
            .hit
            .fields
            .get("source")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Score: {:.4} | {} [{}]\n{}{}\n",
            self.score, self.hit.id, source, preview, ellipsis
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(index: IndexKind, score: f32) -> SearchHit {
        let mut fields = Metadata::new();
        fields.insert("source".to_string(), "hoc_phi.pdf".into());
        SearchHit {
            id: "doc_chunk_0".to_string(),
            score,
            text: "Học phí học kỳ 1 năm học 2025".to_string(),
            fields,
            index,
        }
    }

    #[test]
    fn test_merged_hit_tracks_source_index() {
        let dense = MergedHit::from_hit(hit(IndexKind::Dense, 0.8));
        assert_eq!(dense.dense_score, Some(0.8));
        assert_eq!(dense.sparse_score, None);
        assert!(!dense.matched_by_both());

        let sparse = MergedHit::from_hit(hit(IndexKind::Sparse, 3.2));
        assert_eq!(sparse.sparse_score, Some(3.2));
    }

    #[test]
    fn test_format_summary() {
        let reranked = RerankedHit {
            score: 0.87,
            hit: MergedHit::from_hit(hit(IndexKind::Dense, 0.5)),
            reranked: true,
        };

        let summary = reranked.format_summary(8);
        assert!(summary.contains("0.8700"));
        assert!(summary.contains("hoc_phi.pdf"));
        assert!(summary.contains("Học phí ..."));
    }

    #[test]
    fn test_retrieved_chunk_uses_reranked_score() {
        let reranked = RerankedHit {
            score: 0.42,
            hit: MergedHit::from_hit(hit(IndexKind::Sparse, 7.0)),
            reranked: true,
        };
        let chunk = RetrievedChunk::from(reranked);
        assert_eq!(chunk.score, 0.42);
        assert!(chunk.metadata.contains_key("source"));
    }
}
