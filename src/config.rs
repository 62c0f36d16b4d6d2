// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on records per write request imposed by the index API.
pub const MAX_INDEX_BATCH_SIZE: usize = 96;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub upsert: UpsertConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    pub api_key: Option<String>,
    pub dense_host: String,
    pub sparse_host: String,
    pub rerank_url: String,
    pub rerank_model: String,
    pub api_version: String,
    pub namespace: String,
    /// Record field holding chunk text; the index embeds this field.
    pub text_field: String,
    pub id_scheme: IdScheme,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `{document_id}_chunk_{index}`
    Named,
    /// `point_start + index`, for indexes keyed by integers.
    Point,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStrategy {
    None,
    Fixed,
    Smart,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub record_strategy: RecordStrategy,
    pub records_per_chunk: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub min_content_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpsertConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_budget_secs: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Attempt number after which resource-constrained failures switch to degraded mode.
    pub degrade_after: u32,
    pub degraded_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub top_n: usize,
    pub rerank_max_chars: usize,
    pub max_query_chars: usize,
    pub search_retries: u32,
    pub search_timeout_secs: u64,
    pub rerank_timeout_secs: u64,
    pub infer_filters: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub max_concurrent_ingests: usize,
    pub skip_patterns: Vec<String>,
    pub max_file_size_mb: usize,
    pub force_reprocess: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub metadata_path: PathBuf,
    pub status_ttl_secs: u64,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let defaults = config::Config::try_from(&Self::default_config())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new("config/default.toml")).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HYBRID_RAG")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if config.index.api_key.is_none() {
            config.index.api_key = std::env::var("PINECONE_API_KEY").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            index: IndexConfig {
                api_key: None,
                dense_host: "https://dense-index.svc.pinecone.io".to_string(),
                sparse_host: "https://sparse-index.svc.pinecone.io".to_string(),
                rerank_url: "https://api.pinecone.io/rerank".to_string(),
                rerank_model: "bge-reranker-v2-m3".to_string(),
                api_version: "2025-01".to_string(),
                namespace: "default".to_string(),
                text_field: "chunk_text".to_string(),
                id_scheme: IdScheme::Named,
                request_timeout_secs: 30,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                record_strategy: RecordStrategy::Smart,
                records_per_chunk: 100,
                min_chunk_size: 50,
                max_chunk_size: 500,
                min_content_chars: 10,
            },
            upsert: UpsertConfig {
                batch_size: MAX_INDEX_BATCH_SIZE,
                max_retries: 8,
                retry_budget_secs: 80,
                base_delay_ms: 500,
                max_delay_ms: 10_000,
                degrade_after: 2,
                degraded_batch_size: 8,
            },
            retrieval: RetrievalConfig {
                top_k: 15,
                top_n: 5,
                rerank_max_chars: 512,
                max_query_chars: 1000,
                search_retries: 2,
                search_timeout_secs: 10,
                rerank_timeout_secs: 10,
                infer_filters: false,
            },
            pipeline: PipelineConfig {
                max_concurrent_ingests: 4,
                skip_patterns: vec![".git/".to_string(), "*.zip".to_string()],
                max_file_size_mb: 50,
                force_reprocess: false,
            },
            storage: StorageConfig {
                metadata_path: PathBuf::from("data/documents.json"),
                status_ttl_secs: 3600,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.upsert.validate()?;
        self.retrieval.validate()?;

        if self.pipeline.max_concurrent_ingests == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_ingests must be greater than 0".to_string(),
            ));
        }

        if self.index.namespace.trim().is_empty() {
            return Err(PipelineError::Config("namespace cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.min_chunk_size > self.max_chunk_size {
            return Err(PipelineError::Config(format!(
                "min_chunk_size ({}) exceeds max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }

        if self.records_per_chunk == 0 {
            return Err(PipelineError::Config(
                "records_per_chunk must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl UpsertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_INDEX_BATCH_SIZE {
            return Err(PipelineError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_INDEX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.max_retries == 0 {
            return Err(PipelineError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.retry_budget_secs == 0 {
            return Err(PipelineError::Config(
                "retry_budget_secs must be greater than 0".to_string(),
            ));
        }

        if self.degraded_batch_size == 0 {
            return Err(PipelineError::Config(
                "degraded_batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(PipelineError::Config(
                "top_n must be greater than 0".to_string(),
            ));
        }

        if self.max_query_chars == 0 {
            return Err(PipelineError::Config(
                "max_query_chars must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
