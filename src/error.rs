// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which of the two index views an error or hit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Dense,
    Sparse,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Dense => write!(f, "dense"),
            IndexKind::Sparse => write!(f, "sparse"),
        }
    }
}

/// Classification of a failed call against a remote capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    RateLimited,
    /// The remote side ran out of accelerator memory or capacity.
    ResourceExhausted,
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate limited",
            FailureKind::ResourceExhausted => "resource exhausted",
            FailureKind::Fatal => "fatal",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error in {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("{index} index error ({kind}): {message}")]
    Index {
        index: IndexKind,
        kind: FailureKind,
        message: String,
    },

    #[error("Rerank error ({kind}): {message}")]
    Rerank { kind: FailureKind, message: String },

    #[error("Partial commit for document {document_id}: {failed_groups} of {total_groups} batches failed")]
    PartialCommit {
        document_id: String,
        failed_groups: usize,
        total_groups: usize,
    },

    #[error("Duplicate document: {file_name} already ingested as {document_id}")]
    DuplicateDocument {
        file_name: String,
        document_id: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn index(index: IndexKind, kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Index {
            index,
            kind,
            message: message.into(),
        }
    }

    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Index { kind, .. } | Self::Rerank { kind, .. } => *kind != FailureKind::Fatal,
            Self::Timeout(_) | Self::Http(_) => true,
            _ => false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateDocument { .. })
    }

    pub fn is_resource_constrained(&self) -> bool {
        matches!(
            self,
            Self::Index {
                kind: FailureKind::ResourceExhausted,
                ..
            } | Self::Rerank {
                kind: FailureKind::ResourceExhausted,
                ..
            }
        )
    }
}
