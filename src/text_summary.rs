//! Text summary builder for CLI output.

use crate::model::{RunConfig, RunMode};
use crate::orchestrator::ProcessedRun;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a completed run.
pub(crate) fn build_text_summary(cfg: &RunConfig, processed: &ProcessedRun) -> TextSummary {
    let mut lines = Vec::new();

    match &cfg.mode {
        RunMode::Single { inchikey } => lines.push(format!("Mode: single compound ({inchikey})")),
        RunMode::Batch => lines.push("Mode: batch".to_string()),
    }
    lines.push(format!(
        "Parameters: mz_tol {:.2} rt_tol {:.2} rt_offset {:+.2} specificity {:.2}",
        cfg.mz_tolerance, cfg.rt_tolerance, cfg.rt_offset, cfg.specificity_weight
    ));
    lines.push(format!("Optimized transitions: {}", processed.results.len()));

    for record in &processed.results {
        let field = |name: &str| record.get(name).unwrap_or("-");
        lines.push(format!(
            "  {}  {} -> {}  rt {}  score {}",
            field("InChIKey"),
            field("precursor_mz"),
            field("product_mz"),
            field("rt"),
            field("score")
        ));
    }

    TextSummary { lines }
}
