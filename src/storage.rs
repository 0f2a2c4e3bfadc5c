//! Run history storage: auto-save under the user data directory and
//! explicit JSON export.

use crate::model::RunSummary;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine the user data directory")?;
    Ok(base.join("mrm-tune"))
}

/// Auto-save a run summary, one timestamped file per run.
pub fn save_run(summary: &RunSummary) -> Result<PathBuf> {
    let dir = data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let format =
        time::macros::format_description!("[year][month][day]T[hour][minute][second]Z");
    let stamp = time::OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "now".into());
    let path = dir.join(format!("run-{stamp}-{}.json", summary.run_id));
    write_json(&path, summary)?;
    Ok(path)
}

/// Export a run summary to an explicit path.
pub fn export_json(path: &Path, summary: &RunSummary) -> Result<()> {
    write_json(path, summary)
}

fn write_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailurePolicy, ResultRecord, RunConfig, RunMode, MAX_COMPOUNDS};
    use tempfile::TempDir;

    fn summary() -> RunSummary {
        let results = vec![ResultRecord::new(vec![
            ("InChIKey".into(), "AAA".into()),
            ("score".into(), "0.9".into()),
        ])];
        RunSummary {
            timestamp_utc: "2024-01-01T00:00:00Z".into(),
            run_id: "42".into(),
            config: RunConfig {
                run_id: "42".into(),
                mz_tolerance: 0.7,
                rt_tolerance: 2.0,
                rt_offset: 0.0,
                specificity_weight: 0.2,
                max_compounds: MAX_COMPOUNDS,
                output_path: "out.csv".into(),
                mode: RunMode::Single {
                    inchikey: "AAA".into(),
                },
                failure_policy: FailurePolicy::Abort,
            },
            record_count: 1,
            results,
        }
    }

    #[test]
    fn exported_summary_roundtrips_through_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        export_json(&path, &summary()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let back: RunSummary = serde_json::from_str(&content).unwrap();
        assert_eq!(back.run_id, "42");
        assert_eq!(back.record_count, 1);
        assert_eq!(back.results[0].get("InChIKey"), Some("AAA"));
        assert!(back.config.mode.is_single());
    }

    #[test]
    fn export_to_an_unwritable_path_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("run.json");
        let err = export_json(&path, &summary()).unwrap_err();
        assert!(err.to_string().contains("failed to write"));
    }
}
