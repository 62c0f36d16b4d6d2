// file: src/pipeline/status.rs
// description: key-scoped processing status for background uploads with ttl eviction
// reference: one writer task per handle, many readers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestState {
    Processing,
    Completed { document_id: String, chunks: usize },
    Failed { reason: String },
}

impl IngestState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, IngestState::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub handle: String,
    pub file_name: String,
    #[serde(flatten)]
    pub state: IngestState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct Slot {
    entry: StatusEntry,
    finished: Option<Instant>,
}

/// Finished entries expire `ttl` after completion; running ones never do.
pub struct StatusStore {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
}

impl StatusStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn start(&self, handle: &str, file_name: &str) {
        let mut slots = self.slots();
        self.evict(&mut slots);
        slots.insert(
            handle.to_string(),
            Slot {
                entry: StatusEntry {
                    handle: handle.to_string(),
                    file_name: file_name.to_string(),
                    state: IngestState::Processing,
                    started_at: Utc::now(),
                    finished_at: None,
                },
                finished: None,
            },
        );
    }

    pub fn complete(&self, handle: &str, document_id: &str, chunks: usize) {
        self.finish(
            handle,
            IngestState::Completed {
                document_id: document_id.to_string(),
                chunks,
            },
        );
    }

    pub fn fail(&self, handle: &str, reason: &str) {
        self.finish(
            handle,
            IngestState::Failed {
                reason: reason.to_string(),
            },
        );
    }

    fn finish(&self, handle: &str, state: IngestState) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(handle) {
            slot.entry.state = state;
            slot.entry.finished_at = Some(Utc::now());
            slot.finished = Some(Instant::now());
        } else {
            debug!("Status handle {} expired before it finished", handle);
        }
    }

    pub fn get(&self, handle: &str) -> Option<StatusEntry> {
        let mut slots = self.slots();
        self.evict(&mut slots);
        slots.get(handle).map(|slot| slot.entry.clone())
    }

    pub fn len(&self) -> usize {
        let mut slots = self.slots();
        self.evict(&mut slots);
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, slots: &mut HashMap<String, Slot>) {
        let before = slots.len();
        slots.retain(|_, slot| slot.finished.is_none_or(|at| at.elapsed() < self.ttl));
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!("Evicted {} expired status entries", evicted);
        }
    }
}
