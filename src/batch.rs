// Corpus runner: sequential, or fixed-width batches of concurrent workers where each batch
// finishes before the next one starts. Document failures become per-file statistics.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::error::{ConfigError, DocumentError};
use crate::pipeline::{DocumentOutcome, Pipeline};

/// Processing status of one file
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    Skipped,
    Failed,
}

/// Per-file processing statistics
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileStats {
    /// Source file path
    pub path: String,
    pub status: FileStatus,
    /// Why the file was skipped or failed
    pub reason: Option<String>,
    /// Machine-readable skip category, see [`DocumentError::kind`]
    pub error_kind: Option<String>,
    /// Word elements written
    pub tokens: u64,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl FileStats {
    fn from_result(path: &Path, result: Result<DocumentOutcome, DocumentError>, started: Instant) -> Self {
        let processing_time_ms = started.elapsed().as_millis() as u64;
        let path_str = path.display().to_string();

        match result {
            Ok(DocumentOutcome::Written { tokens, .. }) => Self {
                path: path_str,
                status: FileStatus::Processed,
                reason: None,
                error_kind: None,
                tokens: tokens as u64,
                processing_time_ms,
            },
            Ok(DocumentOutcome::AlreadyExists { output }) => {
                info!("Skipping {}: {} already exists", path.display(), output.display());
                Self {
                    path: path_str,
                    status: FileStatus::Skipped,
                    reason: Some(format!("output {} already exists", output.display())),
                    error_kind: Some("exists".to_string()),
                    tokens: 0,
                    processing_time_ms,
                }
            }
            Err(e) => {
                let status = match e {
                    DocumentError::Io(_) => FileStatus::Failed,
                    _ => FileStatus::Skipped,
                };
                warn!("Skipping {}: {}", path.display(), e);
                Self {
                    path: path_str,
                    status,
                    reason: Some(e.to_string()),
                    error_kind: Some(e.kind().to_string()),
                    tokens: 0,
                    processing_time_ms,
                }
            }
        }
    }

    fn worker_lost(path: &Path, message: String) -> Self {
        error!("Worker for {} did not complete: {}", path.display(), message);
        Self {
            path: path.display().to_string(),
            status: FileStatus::Failed,
            reason: Some(message),
            error_kind: Some("worker".to_string()),
            tokens: 0,
            processing_time_ms: 0,
        }
    }
}

/// Summary of a corpus run
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RunStats {
    pub files_total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_tokens: u64,
    pub elapsed_ms: u64,
    pub files: Vec<FileStats>,
}

impl RunStats {
    pub fn from_files(files: Vec<FileStats>, elapsed_ms: u64) -> Self {
        let count = |status: FileStatus| files.iter().filter(|f| f.status == status).count();
        Self {
            files_total: files.len(),
            processed: count(FileStatus::Processed),
            skipped: count(FileStatus::Skipped),
            failed: count(FileStatus::Failed),
            total_tokens: files.iter().map(|f| f.tokens).sum(),
            elapsed_ms,
            files,
        }
    }

    /// Write as pretty JSON
    pub async fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Drives a [`Pipeline`] over a list of files
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Fail when any raw file already contains the past-tense marker. Runs before any
    /// document is processed; unreadable files are left for the pipeline to report.
    pub async fn validate_corpus(&self, files: &[PathBuf]) -> Result<(), ConfigError> {
        let marker = self.pipeline.marker();
        for path in files {
            match tokio::fs::read_to_string(path).await {
                Ok(raw) => marker.check_absent(&raw, path)?,
                Err(e) => warn!("Cannot pre-check {}: {}", path.display(), e),
            }
        }
        info!("Marker {:?} absent from {} corpus files", marker.as_str(), files.len());
        Ok(())
    }

    /// Process every file. `on_file` sees each file's stats as soon as they exist.
    pub async fn run(&self, files: &[PathBuf], mut on_file: impl FnMut(&FileStats)) -> RunStats {
        let started = Instant::now();
        let config = self.pipeline.config();
        let width = if config.concurrent { config.batch_width.max(1) } else { 1 };
        info!(
            "Processing {} files {}",
            files.len(),
            if config.concurrent {
                format!("in batches of {width}")
            } else {
                "sequentially".to_string()
            }
        );

        let mut all_stats = Vec::with_capacity(files.len());
        for batch in files.chunks(width) {
            let handles = batch.iter().map(|path| {
                let pipeline = Arc::clone(&self.pipeline);
                let path = path.clone();
                tokio::task::spawn_blocking(move || {
                    let file_started = Instant::now();
                    let result = pipeline.process_file(&path);
                    FileStats::from_result(&path, result, file_started)
                })
            });

            // the whole batch settles before the next one starts
            let results = join_all(handles).await;
            for (path, joined) in batch.iter().zip(results) {
                let stats = joined.unwrap_or_else(|e| FileStats::worker_lost(path, e.to_string()));
                on_file(&stats);
                all_stats.push(stats);
            }
        }

        let stats = RunStats::from_files(all_stats, started.elapsed().as_millis() as u64);
        info!(
            "Run complete: {} processed, {} skipped, {} failed in {}ms",
            stats.processed, stats.skipped, stats.failed, stats.elapsed_ms
        );
        stats
    }
}
