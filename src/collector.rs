//! Result collection and persistence.
//!
//! Owns the in-memory result set of the last run and writes it out as a
//! delimited table. An empty set produces no file; the in-memory results
//! stay retrievable whether or not persistence succeeded.

use crate::model::ResultRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write results to {}", path.display())]
pub struct WriteError {
    path: PathBuf,
    #[source]
    source: csv::Error,
}

#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Vec<ResultRecord>,
}

impl ResultCollector {
    pub fn new(results: Vec<ResultRecord>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ResultRecord> {
        self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Write the result set as UTF-8 CSV, header row first. Returns the
    /// written path, or `Ok(None)` when there was nothing to write.
    pub fn persist(&self, path: &Path) -> Result<Option<PathBuf>, WriteError> {
        let Some(first) = self.results.first() else {
            return Ok(None);
        };
        self.write_csv(path, first).map_err(|source| WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(path.to_path_buf()))
    }

    fn write_csv(&self, path: &Path, first: &ResultRecord) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        // The first record defines the column set; the schema is
        // optimizer-owned and every row of one run shares it.
        let names: Vec<&str> = first.field_names().collect();
        writer.write_record(&names)?;
        for record in &self.results {
            writer.write_record(names.iter().map(|n| record.get(n).unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }
}
