// file: src/index/pinecone.rs
// description: records API client for an integrated-embedding dense or sparse index
// reference: https://docs.pinecone.io/reference/api/2025-01/data-plane/upsert_records

use crate::config::IndexConfig;
use crate::error::{FailureKind, IndexKind, PipelineError, Result};
use crate::index::{IndexStats, SearchIndex};
use crate::models::{Chunk, SearchHit, metadata_from_json};
use crate::retrieval::filters::MetadataFilter;
use crate::utils::retry::ExecutionMode;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: SearchQuery<'a>,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    inputs: SearchInputs<'a>,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SearchInputs<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResultBody,
}

#[derive(Debug, Deserialize)]
struct SearchResultBody {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f32,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
struct NamespaceStats {
    #[serde(rename = "vectorCount", default)]
    vector_count: u64,
}

pub struct PineconeIndexClient {
    client: Client,
    kind: IndexKind,
    host: String,
    api_key: String,
    api_version: String,
    text_field: String,
    degraded_batch_size: usize,
}

impl PineconeIndexClient {
    pub fn new(kind: IndexKind, config: &IndexConfig, degraded_batch_size: usize) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Config("index.api_key is required for remote indexes".to_string())
        })?;

        let host = match kind {
            IndexKind::Dense => &config.dense_host,
            IndexKind::Sparse => &config.sparse_host,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            kind,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            api_version: config.api_version.clone(),
            text_field: config.text_field.clone(),
            degraded_batch_size: degraded_batch_size.max(1),
        })
    }

    fn record_line(&self, chunk: &Chunk) -> Result<String> {
        let mut record = Map::new();
        for (key, value) in &chunk.metadata {
            record.insert(key.clone(), value.to_json());
        }
        record.insert("_id".to_string(), Value::String(chunk.id.clone()));
        record.insert(self.text_field.clone(), Value::String(chunk.text.clone()));
        Ok(serde_json::to_string(&Value::Object(record))?)
    }

    async fn upsert_records(&self, namespace: &str, chunks: &[Chunk]) -> Result<usize> {
        let body = chunks
            .iter()
            .map(|chunk| self.record_line(chunk))
            .collect::<Result<Vec<_>>>()?
            .join("\n");

        let url = format!("{}/records/namespaces/{}/upsert", self.host, namespace);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error("upsert", e))?;

        self.check_status("upsert", response).await?;
        Ok(chunks.len())
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        self.check_status(operation, response).await
    }

    async fn check_status(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let kind = classify_status(status, &error_text);

        Err(PipelineError::index(
            self.kind,
            kind,
            format!("{} failed with status {}: {}", operation, status, error_text),
        ))
    }

    fn transport_error(&self, operation: &str, e: reqwest::Error) -> PipelineError {
        let kind = if e.is_builder() {
            FailureKind::Fatal
        } else {
            FailureKind::Transient
        };
        PipelineError::index(
            self.kind,
            kind,
            format!("Failed to send {} request: {}", operation, e),
        )
    }

    fn into_hit(&self, raw: RawHit) -> SearchHit {
        let mut fields = raw.fields;
        let text = match fields.remove(&self.text_field) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        SearchHit {
            id: raw.id,
            score: raw.score,
            text,
            fields: metadata_from_json(&fields),
            index: self.kind,
        }
    }
}

/// Maps an HTTP failure to how the caller should react to it.
pub fn classify_status(status: StatusCode, body: &str) -> FailureKind {
    let body = body.to_lowercase();
    if status == StatusCode::INSUFFICIENT_STORAGE
        || body.contains("out of memory")
        || body.contains("resource exhausted")
        || body.contains("capacity")
    {
        FailureKind::ResourceExhausted
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        FailureKind::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        FailureKind::Transient
    } else {
        FailureKind::Fatal
    }
}

#[async_trait]
impl SearchIndex for PineconeIndexClient {
    fn kind(&self) -> IndexKind {
        self.kind
    }

    async fn upsert(&self, namespace: &str, chunks: &[Chunk], mode: ExecutionMode) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        match mode {
            ExecutionMode::Standard => {
                debug!("Upserting {} records to {} index", chunks.len(), self.kind);
                self.upsert_records(namespace, chunks).await
            }
            ExecutionMode::Degraded => {
                warn!(
                    "Upserting {} records to {} index in degraded mode ({} per request)",
                    chunks.len(),
                    self.kind,
                    self.degraded_batch_size
                );
                let mut written = 0;
                for part in chunks.chunks(self.degraded_batch_size) {
                    written += self.upsert_records(namespace, part).await?;
                }
                Ok(written)
            }
        }
    }

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/records/namespaces/{}/search", self.host, namespace);
        let request = SearchRequest {
            query: SearchQuery {
                inputs: SearchInputs { text: query },
                top_k,
                filter: filter.filter(|f| !f.is_empty()).map(|f| f.to_json()),
            },
        };

        debug!("Searching {} index (top_k={})", self.kind, top_k);

        let response = self.post_json("search", &url, &request).await?;
        let parsed: SearchResponse = response.json().await.map_err(|e| {
            PipelineError::index(
                self.kind,
                FailureKind::Fatal,
                format!("Failed to parse search response: {}", e),
            )
        })?;

        Ok(parsed
            .result
            .hits
            .into_iter()
            .map(|raw| self.into_hit(raw))
            .collect())
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let url = format!("{}/vectors/delete", self.host);
        for part in ids.chunks(DELETE_BATCH_SIZE) {
            let request = DeleteRequest {
                ids: part,
                namespace,
            };
            self.post_json("delete", &url, &request).await?;
        }
        debug!("Deleted {} records from {} index", ids.len(), self.kind);
        Ok(())
    }

    async fn describe(&self, namespace: &str) -> Result<IndexStats> {
        let url = format!("{}/describe_index_stats", self.host);
        let response = self.post_json("describe", &url, &json!({})).await?;
        let parsed: StatsResponse = response.json().await.map_err(|e| {
            PipelineError::index(
                self.kind,
                FailureKind::Fatal,
                format!("Failed to parse stats response: {}", e),
            )
        })?;

        Ok(IndexStats {
            index: self.kind,
            namespace: namespace.to_string(),
            record_count: parsed
                .namespaces
                .get(namespace)
                .map(|ns| ns.vector_count)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Metadata;

    fn client() -> PineconeIndexClient {
        let mut config = Config::default_config().index;
        config.api_key = Some("test-key".to_string());
        PineconeIndexClient::new(IndexKind::Sparse, &config, 8).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let config = Config::default_config().index;
        assert!(matches!(
            PineconeIndexClient::new(IndexKind::Dense, &config, 8),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "try later"),
            FailureKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "CUDA out of memory"),
            FailureKind::ResourceExhausted
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "bad filter"),
            FailureKind::Fatal
        );
    }

    #[test]
    fn test_record_line_is_flat() {
        let mut metadata = Metadata::new();
        metadata.insert("chunk_index".into(), 0usize.into());
        let chunk = Chunk {
            id: "doc_chunk_0".to_string(),
            text: "Lịch thi cuối kỳ".to_string(),
            source_document_id: "doc".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            metadata,
        };

        let line = client().record_line(&chunk).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"_id": "doc_chunk_0", "chunk_text": "Lịch thi cuối kỳ", "chunk_index": 0})
        );
    }

    #[test]
    fn test_hit_parsing_extracts_text_field() {
        let body = json!({
            "result": {"hits": [
                {"_id": "a_chunk_1", "_score": 0.75, "fields": {"chunk_text": "Học bổng", "source": "hb.pdf"}}
            ]}
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let client = client();
        let hits: Vec<SearchHit> = parsed.result.hits.into_iter().map(|h| client.into_hit(h)).collect();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Học bổng");
        assert_eq!(hits[0].index, IndexKind::Sparse);
        assert!(hits[0].fields.contains_key("source"));
        assert!(!hits[0].fields.contains_key("chunk_text"));
    }

    #[test]
    fn test_search_request_shape() {
        let filter = MetadataFilter::new().eq("department", "DAO TAO");
        let request = SearchRequest {
            query: SearchQuery {
                inputs: SearchInputs { text: "học phí" },
                top_k: 15,
                filter: Some(filter.to_json()),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["query"]["inputs"]["text"], "học phí");
        assert_eq!(value["query"]["top_k"], 15);
        assert_eq!(value["query"]["filter"]["department"]["$eq"], "DAO TAO");
    }
}
