// file: src/retrieval/filters.rs
// description: equality metadata filters pushed down to both indexes, and filter inference from queries
// reference: metadata filtering for namespace-scoped hybrid search

use crate::models::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const DOCUMENT_TYPES: [&str; 4] = ["thông báo", "quyết định", "văn bản", "kế hoạch"];
const DEPARTMENTS: [&str; 4] = ["đào tạo", "công tác sinh viên", "khảo thí", "tài chính"];

/// Conjunction of `field == value` conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<MetadataValue>) -> Self {
        self.conditions.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Index-native form: `{"field": {"$eq": value}, ...}`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (field, value) in &self.conditions {
            object.insert(field.clone(), json!({ "$eq": value.to_json() }));
        }
        Value::Object(object)
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }

    /// Parses `key=value` pairs as given on the command line.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Option<Self> {
        let mut filter = Self::new();
        for pair in pairs {
            if let Some((key, value)) = pair.as_ref().split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    filter = filter.eq(key, MetadataValue::parse_loose(value.trim()));
                }
            }
        }
        if filter.is_empty() { None } else { Some(filter) }
    }
}

/// Detects a document type and department named in a lowercase query.
pub fn infer_filters(query: &str) -> Option<MetadataFilter> {
    let lowered = query.to_lowercase();
    let mut filter = MetadataFilter::new();

    if let Some(doc_type) = DOCUMENT_TYPES.iter().find(|t| lowered.contains(*t)) {
        filter = filter.eq("document_type", doc_type.to_uppercase());
    }

    if let Some(department) = DEPARTMENTS.iter().find(|d| lowered.contains(*d)) {
        filter = filter.eq("department", department.to_uppercase());
    }

    if filter.is_empty() { None } else { Some(filter) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json() {
        let filter = MetadataFilter::new()
            .eq("document_type", "THÔNG BÁO")
            .eq("year", 2025i64);
        assert_eq!(
            filter.to_json(),
            json!({"document_type": {"$eq": "THÔNG BÁO"}, "year": {"$eq": 2025}})
        );
    }

    #[test]
    fn test_matches() {
        let mut metadata = Metadata::new();
        metadata.insert("department".into(), "ĐÀO TẠO".into());
        metadata.insert("year".into(), 2025i64.into());

        assert!(MetadataFilter::new().eq("department", "ĐÀO TẠO").matches(&metadata));
        assert!(!MetadataFilter::new().eq("year", 2024i64).matches(&metadata));
        assert!(MetadataFilter::new().matches(&metadata));
    }

    #[test]
    fn test_infer_filters() {
        let filter = infer_filters("thông báo của phòng đào tạo về lịch thi").unwrap();
        assert_eq!(
            filter,
            MetadataFilter::new()
                .eq("document_type", "THÔNG BÁO")
                .eq("department", "ĐÀO TẠO")
        );

        assert!(infer_filters("lịch thi cuối kỳ").is_none());
    }

    #[test]
    fn test_from_pairs() {
        let filter = MetadataFilter::from_pairs(&["department=DAO TAO", "year=2025", "bogus"]).unwrap();
        assert_eq!(filter.len(), 2);
        assert!(MetadataFilter::from_pairs(&["nothing"]).is_none());
    }
}
