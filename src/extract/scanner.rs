// file: src/extract/scanner.rs
// description: walks an upload directory and lists the files the classifier admits
// reference: https://docs.rs/walkdir

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::extract::classifier::FileClassifier;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path below the scanned root, `/` separated.
    pub relative_path: String,
    pub size: u64,
    pub category: &'static str,
}

pub struct FileScanner {
    config: PipelineConfig,
}

impl FileScanner {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Ingestible files under `root` in file name order. Skipped
    /// directories are pruned rather than walked.
    pub fn scan_directory(&self, root: &Path) -> Result<Vec<ScannedFile>> {
        if !root.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        info!("Scanning directory: {}", root.display());
        let max_bytes = self.config.max_file_size_mb as u64 * 1024 * 1024;
        let skip_patterns = &self.config.skip_patterns;

        let files: Vec<ScannedFile> = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !FileClassifier::matches_skip_pattern(
                        relative(root, entry.path()),
                        entry.file_type().is_dir(),
                        skip_patterns,
                    )
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Unreadable entry under {}: {}", root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| admit(root, &entry, max_bytes))
            .collect();

        info!("Found {} ingestible files", files.len());
        Ok(files)
    }
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn admit(root: &Path, entry: &DirEntry, max_bytes: u64) -> Option<ScannedFile> {
    let path = entry.path();
    let size = entry.metadata().ok()?.len();

    match FileClassifier::accepts(path, size, max_bytes) {
        Ok(category) => Some(ScannedFile {
            path: path.to_path_buf(),
            relative_path: relative(root, path).to_string_lossy().replace('\\', "/"),
            size,
            category,
        }),
        Err(reason) => {
            debug!("Skipping {}: {}", path.display(), reason);
            None
        }
    }
}
