//! Input ingestion.
//!
//! Turns a raw InChIKey or an uploaded batch file into an [`InputBatch`].
//! Ingestion is pure: nothing is persisted here, and the produced batch is
//! replaced wholesale by the next ingestion call.

use crate::model::InputBatch;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("InChIKey is empty")]
    EmptyIdentifier,
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("unsupported file format: {0} (expected .csv or .txt)")]
    UnsupportedFormat(String),
    #[error("no InChIKey column in {}", .0.display())]
    MissingIdentifierColumn(PathBuf),
    #[error("failed to parse batch CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Batch file formats accepted for upload.
enum BatchFormat {
    Csv,
    Text,
}

fn detect_format(path: &Path) -> Option<BatchFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(BatchFormat::Csv),
        Some(ext) if ext.eq_ignore_ascii_case("txt") => Some(BatchFormat::Text),
        _ => None,
    }
}

/// Ingest a single InChIKey. Whitespace is trimmed; an empty result is an
/// error so a blank form field can never start a job.
pub fn ingest_single(raw: &str) -> Result<InputBatch, IngestError> {
    let inchikey = raw.trim();
    if inchikey.is_empty() {
        return Err(IngestError::EmptyIdentifier);
    }
    Ok(InputBatch::Single {
        inchikey: inchikey.to_string(),
    })
}

/// Ingest a batch file, dispatching on its extension.
///
/// CSV files contribute their `InChIKey` column in row order, duplicates
/// included; dedup happens later when the traversal list is built. TXT files
/// contribute one key per non-blank line.
pub fn ingest_batch(path: &Path) -> Result<InputBatch, IngestError> {
    if !path.exists() {
        return Err(IngestError::MissingFile(path.to_path_buf()));
    }
    let identifiers = match detect_format(path) {
        Some(BatchFormat::Csv) => read_csv_identifiers(path)?,
        Some(BatchFormat::Text) => read_text_identifiers(path)?,
        None => {
            return Err(IngestError::UnsupportedFormat(
                path.display().to_string(),
            ))
        }
    };
    Ok(InputBatch::Table {
        record_count: identifiers.len(),
        source_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        identifiers,
    })
}

fn read_csv_identifiers(path: &Path) -> Result<Vec<String>, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("inchikey"))
        .ok_or_else(|| IngestError::MissingIdentifierColumn(path.to_path_buf()))?;

    let mut identifiers = Vec::new();
    for record in reader.records() {
        let record = record?;
        identifiers.push(record.get(column).unwrap_or("").trim().to_string());
    }
    Ok(identifiers)
}

fn read_text_identifiers(path: &Path) -> Result<Vec<String>, IngestError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
