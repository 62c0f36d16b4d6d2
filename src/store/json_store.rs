// file: src/store/json_store.rs
// description: Persistent document registry backed by a json file
// reference: Production-grade metadata persistence

use crate::error::{PipelineError, Result};
use crate::models::{DocumentRecord, DocumentState};
use crate::store::MetadataStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// On-disk layout of the registry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    documents: HashMap<String, DocumentRecord>,
    /// Per namespace, one past the highest point id ever allocated.
    #[serde(default)]
    point_marks: HashMap<String, u64>,
}

impl Registry {
    fn next_point(&self, namespace: &str) -> u64 {
        let live = self
            .documents
            .values()
            .filter(|r| r.namespace == namespace)
            .map(|r| r.point_end + 1)
            .max()
            .unwrap_or(0);
        self.point_marks.get(namespace).copied().unwrap_or(0).max(live)
    }
}

pub struct JsonMetadataStore {
    storage_path: Option<PathBuf>,
    cache: RwLock<Registry>,
}

impl JsonMetadataStore {
    pub async fn open(storage_path: PathBuf) -> Result<Self> {
        // Ensure storage directory exists
        if let Some(parent) = storage_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Metadata(format!("Failed to create metadata directory: {}", e))
            })?;
        }

        let cache = Self::load(&storage_path).await?;
        info!(
            "Loaded {} document records from {}",
            cache.documents.len(),
            storage_path.display()
        );

        Ok(Self {
            storage_path: Some(storage_path),
            cache: RwLock::new(cache),
        })
    }

    /// A registry that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            cache: RwLock::new(Registry::default()),
        }
    }

    async fn load(path: &Path) -> Result<Registry> {
        if !path.exists() {
            debug!("No existing metadata file found at {:?}", path);
            return Ok(Registry::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Metadata(format!("Failed to read metadata file: {}", e)))?;

        if contents.trim().is_empty() {
            return Ok(Registry::default());
        }

        if let Ok(registry) = serde_json::from_str::<Registry>(&contents) {
            return Ok(registry);
        }

        // files written before point marks were tracked hold the bare record map
        let documents: HashMap<String, DocumentRecord> = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Metadata(format!("Failed to parse metadata: {}", e)))?;
        let mut registry = Registry {
            documents,
            point_marks: HashMap::new(),
        };
        let namespaces: Vec<String> = registry
            .documents
            .values()
            .map(|r| r.namespace.clone())
            .collect();
        for namespace in namespaces {
            let mark = registry.next_point(&namespace);
            registry.point_marks.insert(namespace, mark);
        }
        Ok(registry)
    }

    async fn save(&self, cache: &Registry) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let contents = serde_json::to_string_pretty(cache)?;
        let staging = path.with_extension("json.tmp");

        fs::write(&staging, contents)
            .await
            .map_err(|e| PipelineError::Metadata(format!("Failed to write metadata file: {}", e)))?;
        fs::rename(&staging, path)
            .await
            .map_err(|e| PipelineError::Metadata(format!("Failed to replace metadata file: {}", e)))?;

        debug!("Saved {} document records", cache.documents.len());
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn create_document(&self, record: DocumentRecord) -> Result<()> {
        let mut cache = self.cache.write().await;
        if cache.documents.contains_key(&record.document_id) {
            return Err(PipelineError::Metadata(format!(
                "document {} already exists",
                record.document_id
            )));
        }

        let document_id = record.document_id.clone();
        let namespace = record.namespace.clone();
        let previous_mark = cache.point_marks.get(&namespace).copied();
        let mark = previous_mark.unwrap_or(0).max(record.point_end + 1);
        cache.point_marks.insert(namespace.clone(), mark);
        cache.documents.insert(document_id.clone(), record);

        if let Err(e) = self.save(&cache).await {
            cache.documents.remove(&document_id);
            match previous_mark {
                Some(previous) => cache.point_marks.insert(namespace, previous),
                None => cache.point_marks.remove(&namespace),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn commit_document(&self, document_id: &str) -> Result<DocumentRecord> {
        let mut cache = self.cache.write().await;
        let record = cache
            .documents
            .get_mut(document_id)
            .ok_or_else(|| PipelineError::NotFound(format!("document {}", document_id)))?;

        record.state = DocumentState::Committed;
        let committed = record.clone();
        self.save(&cache).await?;
        Ok(committed)
    }

    async fn delete_document(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let mut cache = self.cache.write().await;
        let removed = cache.documents.remove(document_id);
        if removed.is_some() {
            self.save(&cache).await?;
        }
        Ok(removed)
    }

    async fn find_document_by_id(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.cache.read().await.documents.get(document_id).cloned())
    }

    async fn find_document_by_hash(
        &self,
        namespace: &str,
        file_hash: &str,
    ) -> Result<Option<DocumentRecord>> {
        Ok(self
            .cache
            .read()
            .await
            .documents
            .values()
            .find(|r| r.namespace == namespace && r.file_hash == file_hash && r.is_committed())
            .cloned())
    }

    async fn list_documents(&self, namespace: &str) -> Result<Vec<DocumentRecord>> {
        let mut records: Vec<DocumentRecord> = self
            .cache
            .read()
            .await
            .documents
            .values()
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.point_start);
        Ok(records)
    }

    async fn next_available_point_id(&self, namespace: &str) -> Result<u64> {
        Ok(self.cache.read().await.next_point(namespace))
    }
}
