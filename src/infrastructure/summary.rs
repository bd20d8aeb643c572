//! Summary over written batch artifacts
//!
//! Totals, success rate and a failure breakdown keyed by
//! `(error_type, http_status)`, most common first.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::OutcomeRecord;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("failed to read directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One row of the failure breakdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownEntry {
    /// Raw label as written, so labels from older runs are kept
    pub error_type: Option<String>,
    pub http_status: Option<u16>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryReport {
    pub files: usize,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    /// Sorted by count descending, then by key
    pub breakdown: Vec<BreakdownEntry>,
}

impl SummaryReport {
    /// Fraction of successful records, 0 when nothing was recorded
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== REQUEST SUMMARY =====")?;
        writeln!(f, "Artifacts        : {}", self.files)?;
        writeln!(f, "Total requests   : {}", self.total)?;
        writeln!(f, "Success requests : {}", self.successes)?;
        writeln!(f, "Failed requests  : {}", self.failures)?;
        writeln!(f, "Success rate     : {:.2}%", self.success_rate() * 100.0)?;
        writeln!(f)?;
        writeln!(f, "===== ERROR BREAKDOWN =====")?;
        for entry in &self.breakdown {
            let status = entry
                .http_status
                .map_or_else(|| "None".to_string(), |s| s.to_string());
            writeln!(
                f,
                "{:<22} | status={} | {}",
                entry.error_type.as_deref().unwrap_or("None"),
                status,
                entry.count
            )?;
        }
        Ok(())
    }
}

/// Tally a set of records
pub fn summarize_records<'a, I>(records: I) -> SummaryReport
where
    I: IntoIterator<Item = &'a OutcomeRecord>,
{
    let mut report = SummaryReport::default();
    let mut counts: HashMap<(Option<String>, Option<u16>), usize> = HashMap::new();

    for record in records {
        report.total += 1;
        if record.success {
            report.successes += 1;
        } else {
            *counts
                .entry((record.error_type.clone(), record.http_status))
                .or_default() += 1;
        }
    }
    report.failures = report.total - report.successes;

    let mut breakdown: Vec<BreakdownEntry> = counts
        .into_iter()
        .map(|((error_type, http_status), count)| BreakdownEntry {
            error_type,
            http_status,
            count,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.error_type.cmp(&b.error_type))
            .then_with(|| a.http_status.cmp(&b.http_status))
    });
    report.breakdown = breakdown;
    report
}

/// Read every `*.json` artifact in `dir` and summarize it
pub async fn summarize_dir(dir: &Path) -> Result<SummaryReport, SummaryError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| SummaryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| SummaryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SummaryError::ReadFile {
                path: path.clone(),
                source,
            })?;
        let batch: Vec<OutcomeRecord> = serde_json::from_str(&text).map_err(|source| SummaryError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!("📄 {:?}: {} records", path, batch.len());
        records.extend(batch);
    }

    let mut report = summarize_records(&records);
    report.files = paths.len();
    info!(
        "📊 Summarized {} records from {} artifacts in {:?}",
        report.total, report.files, dir
    );
    Ok(report)
}
