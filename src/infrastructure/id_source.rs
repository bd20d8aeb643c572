//! Input ID list loader
//!
//! Reads catalog item IDs from one column of a CSV file with a header row.

use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::ItemId;

#[derive(Error, Debug)]
pub enum IdSourceError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("malformed CSV at record {record}: {source}")]
    Malformed {
        record: u64,
        #[source]
        source: csv::Error,
    },
}

/// Load IDs from `path`, keeping at most `limit` of them
pub fn load_item_ids(path: &Path, column: &str, limit: Option<usize>) -> Result<Vec<ItemId>, IdSourceError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IdSourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let ids = collect_ids(reader, column, limit)?;
    info!("📥 Loaded {} item IDs from {:?}", ids.len(), path);
    Ok(ids)
}

/// Same as [`load_item_ids`] for any reader
pub fn read_item_ids<R: Read>(input: R, column: &str, limit: Option<usize>) -> Result<Vec<ItemId>, IdSourceError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    collect_ids(reader, column, limit)
}

fn collect_ids<R: Read>(
    mut reader: csv::Reader<R>,
    column: &str,
    limit: Option<usize>,
) -> Result<Vec<ItemId>, IdSourceError> {
    let headers = reader
        .headers()
        .map_err(|source| IdSourceError::Malformed { record: 0, source })?
        .clone();

    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| IdSourceError::MissingColumn {
            column: column.to_string(),
            available: headers.iter().collect::<Vec<_>>().join(", "),
        })?;

    let max = limit.unwrap_or(usize::MAX);
    let mut ids = Vec::new();

    for (row, record) in reader.records().enumerate() {
        if ids.len() >= max {
            break;
        }
        let record = record.map_err(|source| IdSourceError::Malformed {
            record: row as u64 + 1,
            source,
        })?;

        match record.get(index).map(str::parse::<ItemId>) {
            Some(Ok(id)) => ids.push(id),
            Some(Err(_)) | None => {
                warn!("⚠️ Skipping row {}: invalid {} value {:?}", row + 1, column, record.get(index));
            }
        }
    }

    Ok(ids)
}
