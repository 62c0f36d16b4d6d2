// file: src/chunker/records.rs
// description: structured record flattening and record grouping strategies
// reference: tabular chunking for spreadsheet and json sources

use crate::config::RecordStrategy;
use crate::error::{PipelineError, Result};
use crate::models::MetadataValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One structured row. Field order is preserved when flattening.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<(String, Option<MetadataValue>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: Option<MetadataValue>) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    /// Builds a record from a JSON object. Nested values are stringified.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let fields = object
            .iter()
            .map(|(key, value)| {
                let scalar = match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                        Some(MetadataValue::String(value.to_string()))
                    }
                    other => MetadataValue::from_json(other),
                };
                (key.clone(), scalar)
            })
            .collect();

        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A named group of records, e.g. one sheet or one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub name: String,
    pub records: Vec<Record>,
}

/// Renders a record as `field1: value1, field2: value2`. Missing values keep the field name.
pub fn flatten_record(record: &Record) -> String {
    record
        .fields
        .iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{}: {}", name, value),
            None => format!("{}: ", name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChunking {
    NoChunk,
    FixedSize(usize),
    /// Size-bounded greedy grouping; falls back to `FixedSize(fallback_size)`.
    Smart { fallback_size: usize },
}

impl RecordChunking {
    pub fn from_config(strategy: RecordStrategy, records_per_chunk: usize) -> Self {
        match strategy {
            RecordStrategy::None => Self::NoChunk,
            RecordStrategy::Fixed => Self::FixedSize(records_per_chunk),
            RecordStrategy::Smart => Self::Smart {
                fallback_size: records_per_chunk,
            },
        }
    }
}

/// Groups contiguous records. Sizes are measured on the flattened text.
pub fn chunk_records<'a>(
    records: &'a [Record],
    strategy: RecordChunking,
    min_size: usize,
    max_size: usize,
) -> Vec<&'a [Record]> {
    if records.is_empty() {
        return Vec::new();
    }

    match strategy {
        RecordChunking::NoChunk => vec![records],
        RecordChunking::FixedSize(n) => records.chunks(n.max(1)).collect(),
        RecordChunking::Smart { fallback_size } => {
            match smart_groups(records, min_size, max_size) {
                Ok(groups) => groups,
                Err(e) => {
                    warn!(
                        "Smart record grouping failed, using fixed groups of {}: {}",
                        fallback_size, e
                    );
                    records.chunks(fallback_size.max(1)).collect()
                }
            }
        }
    }
}

fn smart_groups(records: &[Record], min_size: usize, max_size: usize) -> Result<Vec<&[Record]>> {
    if max_size == 0 || min_size > max_size {
        return Err(PipelineError::Validation(format!(
            "invalid record group bounds (min {}, max {})",
            min_size, max_size
        )));
    }

    let sizes: Vec<usize> = records
        .iter()
        .map(|r| flatten_record(r).chars().count())
        .collect();

    let mut groups: Vec<(usize, usize, usize)> = Vec::new();
    let mut start = 0;
    let mut current = 0;

    for (i, size) in sizes.iter().enumerate() {
        if i == start {
            current = *size;
            continue;
        }

        // one newline joins records in a group
        let grown = current + 1 + size;
        if grown > max_size {
            groups.push((start, i, current));
            start = i;
            current = *size;
        } else {
            current = grown;
        }
    }
    groups.push((start, records.len(), current));

    rebalance_tail(&mut groups, &sizes, min_size, max_size);

    Ok(groups
        .into_iter()
        .map(|(start, end, _)| &records[start..end])
        .collect())
}

/// Moves records from the second-to-last group into an undersized tail group
/// while both stay within bounds.
fn rebalance_tail(
    groups: &mut [(usize, usize, usize)],
    sizes: &[usize],
    min_size: usize,
    max_size: usize,
) {
    let count = groups.len();
    if count < 2 {
        return;
    }

    let (mut prev, mut tail) = (groups[count - 2], groups[count - 1]);

    while tail.2 < min_size && prev.1 - prev.0 > 1 {
        let moved = sizes[prev.1 - 1];
        let tail_size = moved + 1 + tail.2;
        let prev_size = prev.2 - moved - 1;

        if tail_size > max_size || prev_size < min_size {
            break;
        }

        prev = (prev.0, prev.1 - 1, prev_size);
        tail = (tail.0 - 1, tail.1, tail_size);
    }

    groups[count - 2] = prev;
    groups[count - 1] = tail;
}

/// Text of one record group, one flattened record per line.
pub fn group_text(group: &[Record]) -> String {
    group
        .iter()
        .map(flatten_record)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn course(code: &str, credits: i64) -> Record {
        Record::new()
            .with_field("Mã HP", Some(code.into()))
            .with_field("Số TC", Some(credits.into()))
    }

    fn courses(n: usize) -> Vec<Record> {
        (0..n).map(|i| course(&format!("IT{:04}", i), 3)).collect()
    }

    #[test]
    fn test_flatten_record() {
        let record = Record::new()
            .with_field("Mã HP", Some("IT3080".into()))
            .with_field("Số TC", Some(3i64.into()))
            .with_field("Phòng học", None);

        assert_eq!(flatten_record(&record), "Mã HP: IT3080, Số TC: 3, Phòng học: ");
    }

    #[test]
    fn test_from_json_object_keeps_nulls() {
        let value = serde_json::json!({"lop": "CNTT-01", "phong": null, "tuan": [1, 2]});
        let record = Record::from_json_object(value.as_object().unwrap());
        assert_eq!(flatten_record(&record), "lop: CNTT-01, phong: , tuan: [1,2]");
    }

    #[test]
    fn test_no_chunk_single_group() {
        let records = courses(7);
        let groups = chunk_records(&records, RecordChunking::NoChunk, 0, 100);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 7);
    }

    #[test]
    fn test_fixed_size_groups() {
        let records = courses(10);
        let groups = chunk_records(&records, RecordChunking::FixedSize(4), 0, 100);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_smart_respects_max_size() {
        let records = courses(10);
        let width = flatten_record(&records[0]).chars().count();
        let max = width * 3 + 2;

        let groups = chunk_records(&records, RecordChunking::Smart { fallback_size: 5 }, 0, max);

        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        for group in &groups {
            assert!(group_text(group).chars().count() <= max);
        }
    }

    #[test]
    fn test_smart_oversized_record_is_own_group() {
        let big = Record::new().with_field("ghi chú", Some("x".repeat(300).into()));
        let records = vec![course("IT1", 2), big, course("IT2", 3)];

        let groups = chunk_records(&records, RecordChunking::Smart { fallback_size: 5 }, 0, 100);

        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_smart_rebalances_small_tail() {
        let records = courses(4);
        let width = flatten_record(&records[0]).chars().count();
        let max = width * 3 + 2;

        let groups = chunk_records(&records, RecordChunking::Smart { fallback_size: 5 }, 0, max);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![3, 1]);

        let groups = chunk_records(
            &records,
            RecordChunking::Smart { fallback_size: 5 },
            width + 1,
            max,
        );
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn test_smart_invalid_bounds_fall_back_to_fixed() {
        let records = courses(6);
        let groups = chunk_records(&records, RecordChunking::Smart { fallback_size: 4 }, 10, 5);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![4, 2]);
    }
}
