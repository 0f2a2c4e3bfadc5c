//! Post-run processing utilities.
//!
//! Handles result persistence, exports and auto-save after a run completes,
//! shared by the text, JSON and TUI front-ends.

use crate::collector::ResultCollector;
use crate::model::{ResultRecord, RunConfig, RunSummary};
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub results: Vec<ResultRecord>,
    pub persisted_path: Option<PathBuf>,
    pub messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Stamp a completed run into its persisted shape.
pub(crate) fn build_summary(cfg: &RunConfig, results: &[ResultRecord]) -> RunSummary {
    RunSummary {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        run_id: cfg.run_id.clone(),
        config: cfg.clone(),
        record_count: results.len(),
        results: results.to_vec(),
    }
}

/// Process a completed run: persist the result table, export, auto-save.
///
/// Persistence failures are reported as messages, never as errors; the
/// in-memory results stay available either way.
pub(crate) fn process_run_completion(
    cfg: &RunConfig,
    export_json: Option<&Path>,
    auto_save: bool,
    results: Vec<ResultRecord>,
) -> ProcessedRun {
    let collector = ResultCollector::new(results);
    let mut messages = Vec::new();

    let persisted_path = match collector.persist(&cfg.output_path) {
        Ok(path) => path,
        Err(e) => {
            messages.push(format!("Write failed: {e}"));
            None
        }
    };

    let summary = build_summary(cfg, collector.results());
    if let Some(path) = export_json {
        match storage::export_json(path, &summary) {
            Ok(()) => messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    let auto_saved_path = if auto_save {
        storage::save_run(&summary).ok()
    } else {
        None
    };

    ProcessedRun {
        results: collector.into_results(),
        persisted_path,
        messages,
        auto_saved_path,
    }
}
