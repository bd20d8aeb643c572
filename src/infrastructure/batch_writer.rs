//! Batch artifact writer
//!
//! One pretty-printed JSON array per batch, named after the batch's 1-based
//! offsets so artifacts from the same input never collide.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::domain::{BatchResult, OutcomeRecord};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to create output directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize batch {label}: {source}")]
    Serialize {
        label: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives one complete batch result at a time
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write_batch(&self, start: usize, end: usize, result: &BatchResult) -> Result<(), SinkError>;
}

/// `products_00001_01000.json`
pub fn artifact_file_name(start: usize, end: usize) -> String {
    format!("products_{start:05}_{end:05}.json")
}

/// Writes batch artifacts into a directory
#[derive(Debug, Clone)]
pub struct JsonBatchWriter {
    output_dir: PathBuf,
}

impl JsonBatchWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn artifact_path(&self, start: usize, end: usize) -> PathBuf {
        self.output_dir.join(artifact_file_name(start, end))
    }
}

#[async_trait]
impl BatchSink for JsonBatchWriter {
    async fn write_batch(&self, start: usize, end: usize, result: &BatchResult) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| SinkError::CreateDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let records: Vec<OutcomeRecord> = result.outcomes.iter().map(OutcomeRecord::from).collect();
        let json = serde_json::to_string_pretty(&records).map_err(|source| SinkError::Serialize {
            label: format!("{start:05}_{end:05}"),
            source,
        })?;

        let path = self.artifact_path(start, end);
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| SinkError::Write {
                path: path.clone(),
                source,
            })?;

        info!(
            "💾 Saved {} records to {:?} ({} ok, {} failed)",
            result.len(),
            path,
            result.success_count(),
            result.failure_count()
        );
        Ok(())
    }
}
