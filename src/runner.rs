//! Calculation job runner.
//!
//! Runs one job against the optimizer, one compound at a time, publishing
//! progress to the shared cell. The runner never propagates errors past the
//! worker boundary: every failure lands in the cell via `finish_failure`.

use crate::engine::CompoundOptimizer;
use crate::model::{FailurePolicy, InputBatch, ResultRecord, RunConfig, RunMode};
use crate::progress::ProgressCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const CANCELLED_MESSAGE: &str = "run cancelled";

/// Cooperative cancellation flag, checked between compound iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Run one calculation job to completion, failure or cancellation.
///
/// Returns the accumulated results on success, `None` otherwise; in every
/// case the final outcome is readable from the progress cell.
pub fn run(
    cfg: &RunConfig,
    batch: &InputBatch,
    optimizer: &mut dyn CompoundOptimizer,
    progress: &ProgressCell,
    cancel: &CancelToken,
) -> Option<Vec<ResultRecord>> {
    progress.reset();

    if let Err(e) = optimizer.load_all_data() {
        progress.finish_failure(e.to_string());
        return None;
    }

    let (traversal, total) = traversal_plan(cfg, batch, optimizer);

    let mut results = Vec::new();
    for (i, inchikey) in traversal.iter().enumerate() {
        if cancel.is_cancelled() {
            progress.finish_failure(CANCELLED_MESSAGE);
            return None;
        }
        match optimizer.process_compound(inchikey) {
            Ok(Some(record)) => results.push(record),
            // An unknown compound is not an error, just no row.
            Ok(None) => {}
            Err(e) => match cfg.failure_policy {
                FailurePolicy::Abort => {
                    progress.finish_failure(e.to_string());
                    return None;
                }
                FailurePolicy::Skip => {}
            },
        }
        progress.set_percent(((i + 1) * 100 / total) as u8);
        if cfg.mode.is_single() {
            break;
        }
    }

    progress.finish_success();
    Some(results)
}

/// Build the ordered traversal list and the progress denominator.
///
/// Batch mode walks the optimizer's resolvable identifiers (already unique)
/// restricted to the uploaded batch, capped at `max_compounds`. The
/// denominator is the pre-truncation match count, so a capped batch tops out
/// below 100 until `finish_success` pins it.
fn traversal_plan(
    cfg: &RunConfig,
    batch: &InputBatch,
    optimizer: &dyn CompoundOptimizer,
) -> (Vec<String>, usize) {
    match &cfg.mode {
        RunMode::Single { inchikey } => (vec![inchikey.clone()], 1),
        RunMode::Batch => {
            let wanted: HashSet<&str> = batch
                .identifiers()
                .iter()
                .map(String::as_str)
                .collect();
            let matched: Vec<String> = optimizer
                .resolvable_identifiers()
                .iter()
                .filter(|key| wanted.contains(key.as_str()))
                .cloned()
                .collect();
            let total = matched.len();
            let traversal = matched.into_iter().take(cfg.max_compounds).collect();
            (traversal, total)
        }
    }
}
