// file: src/index/rerank.rs
// description: hosted cross-encoder rerank client
// reference: https://docs.pinecone.io/reference/api/2025-01/inference/rerank

use crate::config::IndexConfig;
use crate::error::{FailureKind, PipelineError, Result};
use crate::index::pinecone::classify_status;
use crate::index::{RerankScore, Reranker};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<Map<String, Value>>,
    rank_fields: Vec<&'a str>,
    top_n: usize,
    return_documents: bool,
    parameters: RerankParameters,
}

#[derive(Debug, Serialize)]
struct RerankParameters {
    truncate: &'static str,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    data: Vec<RerankItem>,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

pub struct PineconeReranker {
    client: Client,
    url: String,
    api_key: String,
    api_version: String,
    model: String,
    text_field: String,
}

impl PineconeReranker {
    pub fn new(config: &IndexConfig, timeout: Duration) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Config("index.api_key is required for reranking".to_string())
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.rerank_url.clone(),
            api_key,
            api_version: config.api_version.clone(),
            model: config.rerank_model.clone(),
            text_field: config.text_field.clone(),
        })
    }

    fn build_request<'a>(&'a self, query: &'a str, documents: &[String], top_n: usize) -> RerankRequest<'a> {
        let documents = documents
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut doc = Map::new();
                doc.insert("id".to_string(), Value::String(i.to_string()));
                doc.insert(self.text_field.clone(), Value::String(text.clone()));
                doc
            })
            .collect();

        RerankRequest {
            model: &self.model,
            query,
            documents,
            rank_fields: vec![self.text_field.as_str()],
            top_n,
            return_documents: false,
            parameters: RerankParameters { truncate: "END" },
        }
    }
}

#[async_trait]
impl Reranker for PineconeReranker {
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        if documents.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let request = self.build_request(query, documents, top_n.min(documents.len()));
        debug!("Reranking {} documents (top_n={})", documents.len(), top_n);

        let response = self
            .client
            .post(&self.url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Rerank {
                kind: FailureKind::Transient,
                message: format!("Failed to send rerank request: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Rerank {
                kind: classify_status(status, &error_text),
                message: format!("rerank failed with status {}: {}", status, error_text),
            });
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| PipelineError::Rerank {
            kind: FailureKind::Fatal,
            message: format!("Failed to parse rerank response: {}", e),
        })?;

        Ok(parsed
            .data
            .into_iter()
            .filter(|item| item.index < documents.len())
            .map(|item| RerankScore {
                index: item.index,
                score: item.score,
            })
            .take(top_n)
            .collect())
    }
}
