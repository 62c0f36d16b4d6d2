// file: src/pipeline/progress.rs
// description: progress tracking and statistics reporting for ingestion runs
// reference: uses indicatif for progress bars and tracks ingestion metrics

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub files_ingested: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub chunks_written: usize,
    pub batches_failed: usize,
    pub total_bytes_processed: u64,
    pub duration_secs: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files_per_second(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.files_ingested as f64 / self.duration_secs as f64
    }

    pub fn chunks_per_second(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.chunks_written as f64 / self.duration_secs as f64
    }

    /// Skipped duplicates count as neither success nor failure.
    pub fn success_rate(&self) -> f64 {
        let total = self.files_ingested + self.files_failed;
        if total == 0 {
            return 0.0;
        }
        (self.files_ingested as f64 / total as f64) * 100.0
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    files_ingested: AtomicUsize,
    files_failed: AtomicUsize,
    files_skipped: AtomicUsize,
    chunks_written: AtomicUsize,
    batches_failed: AtomicUsize,
    bytes_processed: AtomicU64,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_files: usize) -> Self {
        Self::with_color(total_files, true)
    }

    pub fn with_color(total_files: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();
        let main_bar = create_progress_bar(&multi_progress, total_files as u64, colored);
        let detail_bar = create_detail_bar(&multi_progress);
        Self::from_bars(main_bar, detail_bar)
    }

    /// Counts without drawing, for background ingestion.
    pub fn hidden(total_files: usize) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let main_bar = multi_progress.add(ProgressBar::new(total_files as u64));
        let detail_bar = multi_progress.add(ProgressBar::new(0));
        Self::from_bars(main_bar, detail_bar)
    }

    fn from_bars(main_bar: ProgressBar, detail_bar: ProgressBar) -> Self {
        Self {
            main_bar,
            detail_bar,
            files_ingested: AtomicUsize::new(0),
            files_failed: AtomicUsize::new(0),
            files_skipped: AtomicUsize::new(0),
            chunks_written: AtomicUsize::new(0),
            batches_failed: AtomicUsize::new(0),
            bytes_processed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// For runs whose file count is known only after scanning.
    pub fn set_total(&self, total_files: usize) {
        self.main_bar.set_length(total_files as u64);
    }

    pub fn inc_files_ingested(&self) {
        self.files_ingested.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_files_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_files_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_group_committed(&self, chunks: usize) {
        self.chunks_written.fetch_add(chunks, Ordering::SeqCst);
        self.update_detail_bar();
    }

    pub fn inc_group_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::SeqCst);
        self.update_detail_bar();
    }

    pub fn add_bytes_processed(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn set_message(&self, message: String) {
        self.main_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Ingestion complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> IngestStats {
        IngestStats {
            files_ingested: self.files_ingested.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            files_skipped: self.files_skipped.load(Ordering::SeqCst),
            chunks_written: self.chunks_written.load(Ordering::SeqCst),
            batches_failed: self.batches_failed.load(Ordering::SeqCst),
            total_bytes_processed: self.bytes_processed.load(Ordering::SeqCst),
            duration_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn update_detail_bar(&self) {
        let message = format!(
            "Chunks: {} | Failed files: {} | Failed batches: {} | Duplicates: {}",
            self.chunks_written.load(Ordering::SeqCst),
            self.files_failed.load(Ordering::SeqCst),
            self.batches_failed.load(Ordering::SeqCst),
            self.files_skipped.load(Ordering::SeqCst),
        );
        self.detail_bar.set_message(message);
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    if colored {
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .expect("Failed to create progress bar template")
                .progress_chars("█▓▒░"),
        );
    } else {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}")
                .expect("Failed to create progress bar template")
                .progress_chars("=>-"),
        );
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}")
        .expect("Failed to create detail bar template");
    bar.set_style(style);
    bar
}
