//! Reference-library-backed optimizer.
//!
//! Loads a transition library CSV and, per compound, picks the candidate
//! transition with the best blend of signal intensity and specificity
//! against every other compound in the library.

use super::scoring;
use super::{CompoundOptimizer, OptimizerError};
use crate::model::{ResultRecord, RunConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const LIBRARY_COLUMNS: [&str; 5] = ["InChIKey", "precursor_mz", "product_mz", "rt", "intensity"];

#[derive(Debug, Clone)]
struct Transition {
    inchikey: String,
    precursor_mz: f64,
    product_mz: f64,
    rt: f64,
    intensity: f64,
}

pub struct LibraryOptimizer {
    library_path: PathBuf,
    mz_tolerance: f64,
    rt_tolerance: f64,
    rt_offset: f64,
    specificity_weight: f64,
    transitions: Vec<Transition>,
    resolvable: Vec<String>,
}

impl LibraryOptimizer {
    pub fn new(cfg: &RunConfig, library_path: &Path) -> Self {
        Self {
            library_path: library_path.to_path_buf(),
            mz_tolerance: cfg.mz_tolerance,
            rt_tolerance: cfg.rt_tolerance,
            rt_offset: cfg.rt_offset,
            specificity_weight: cfg.specificity_weight,
            transitions: Vec::new(),
            resolvable: Vec::new(),
        }
    }

    fn parse_row(record: &csv::StringRecord, columns: &[usize; 5], row: usize) -> Result<Transition, OptimizerError> {
        let field = |i: usize| record.get(columns[i]).unwrap_or("").trim();
        let number = |i: usize| {
            field(i).parse::<f64>().map_err(|_| {
                OptimizerError::DataLoad(format!(
                    "library row {row}: {} is not a number ({:?})",
                    LIBRARY_COLUMNS[i],
                    field(i)
                ))
            })
        };
        Ok(Transition {
            inchikey: field(0).to_string(),
            precursor_mz: number(1)?,
            product_mz: number(2)?,
            rt: number(3)?,
            intensity: number(4)?,
        })
    }
}

impl CompoundOptimizer for LibraryOptimizer {
    fn load_all_data(&mut self) -> Result<(), OptimizerError> {
        let mut reader = csv::Reader::from_path(&self.library_path)
            .map_err(|e| OptimizerError::DataLoad(e.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|e| OptimizerError::DataLoad(e.to_string()))?
            .clone();
        let mut columns = [0usize; 5];
        for (slot, name) in columns.iter_mut().zip(LIBRARY_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    OptimizerError::DataLoad(format!("library is missing column {name}"))
                })?;
        }

        let mut transitions = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| OptimizerError::DataLoad(e.to_string()))?;
            transitions.push(Self::parse_row(&record, &columns, row + 1)?);
        }

        // Resolvable set: unique keys in first-seen file order.
        let mut seen = HashSet::new();
        self.resolvable = transitions
            .iter()
            .filter(|t| seen.insert(t.inchikey.clone()))
            .map(|t| t.inchikey.clone())
            .collect();
        self.transitions = transitions;
        Ok(())
    }

    fn resolvable_identifiers(&self) -> &[String] {
        &self.resolvable
    }

    fn process_compound(&self, inchikey: &str) -> Result<Option<ResultRecord>, OptimizerError> {
        let candidates: Vec<&Transition> = self
            .transitions
            .iter()
            .filter(|t| t.inchikey == inchikey)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let max_intensity = candidates.iter().map(|t| t.intensity).fold(0.0, f64::max);
        let others: Vec<(f64, f64)> = self
            .transitions
            .iter()
            .filter(|t| t.inchikey != inchikey)
            .map(|t| (t.product_mz, t.rt))
            .collect();

        let mut best: Option<(&Transition, f64)> = None;
        for candidate in candidates {
            let score = scoring::blend(
                scoring::normalized_intensity(candidate.intensity, max_intensity),
                scoring::interference_free_fraction(
                    candidate.product_mz,
                    candidate.rt,
                    &others,
                    self.mz_tolerance,
                    self.rt_tolerance,
                ),
                self.specificity_weight,
            );
            if !score.is_finite() {
                return Err(OptimizerError::Compute {
                    inchikey: inchikey.to_string(),
                    message: "candidate score is not finite".into(),
                });
            }
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((candidate, score));
            }
        }

        let Some((transition, score)) = best else {
            return Ok(None);
        };
        Ok(Some(ResultRecord::new(vec![
            ("InChIKey".into(), transition.inchikey.clone()),
            (
                "precursor_mz".into(),
                format!("{:.4}", transition.precursor_mz),
            ),
            ("product_mz".into(), format!("{:.4}", transition.product_mz)),
            ("rt".into(), format!("{:.2}", transition.rt + self.rt_offset)),
            ("intensity".into(), format!("{:.0}", transition.intensity)),
            ("score".into(), format!("{:.4}", score)),
        ])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailurePolicy, RunMode};
    use std::io::Write;
    use tempfile::TempDir;

    fn config(specificity_weight: f64) -> RunConfig {
        RunConfig {
            run_id: "test".into(),
            mz_tolerance: 0.7,
            rt_tolerance: 2.0,
            rt_offset: 0.0,
            specificity_weight,
            max_compounds: crate::model::MAX_COMPOUNDS,
            output_path: "out.csv".into(),
            mode: RunMode::Batch,
            failure_policy: FailurePolicy::Abort,
        }
    }

    fn write_library(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("library.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_collects_unique_keys_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_library(
            &dir,
            "InChIKey,precursor_mz,product_mz,rt,intensity\n\
             BBB,200.0,120.0,4.0,900\n\
             AAA,180.0,110.0,3.0,500\n\
             BBB,200.0,140.0,4.0,700\n",
        );
        let mut optimizer = LibraryOptimizer::new(&config(0.2), &path);
        optimizer.load_all_data().unwrap();
        assert_eq!(optimizer.resolvable_identifiers(), ["BBB", "AAA"]);
    }

    #[test]
    fn missing_column_fails_the_load() {
        let dir = TempDir::new().unwrap();
        let path = write_library(&dir, "InChIKey,precursor_mz,rt,intensity\nAAA,180.0,3.0,500\n");
        let mut optimizer = LibraryOptimizer::new(&config(0.2), &path);
        let err = optimizer.load_all_data().unwrap_err();
        assert!(matches!(err, OptimizerError::DataLoad(_)));
        assert!(err.to_string().contains("product_mz"));
    }

    #[test]
    fn unknown_compound_yields_no_result() {
        let dir = TempDir::new().unwrap();
        let path = write_library(
            &dir,
            "InChIKey,precursor_mz,product_mz,rt,intensity\nAAA,180.0,110.0,3.0,500\n",
        );
        let mut optimizer = LibraryOptimizer::new(&config(0.2), &path);
        optimizer.load_all_data().unwrap();
        assert!(optimizer.process_compound("ZZZ").unwrap().is_none());
    }

    #[test]
    fn pure_intensity_weighting_picks_the_strongest_transition() {
        let dir = TempDir::new().unwrap();
        let path = write_library(
            &dir,
            "InChIKey,precursor_mz,product_mz,rt,intensity\n\
             AAA,180.0,110.0,3.0,500\n\
             AAA,180.0,130.0,3.0,900\n",
        );
        let mut optimizer = LibraryOptimizer::new(&config(0.0), &path);
        optimizer.load_all_data().unwrap();
        let record = optimizer.process_compound("AAA").unwrap().unwrap();
        assert_eq!(record.get("product_mz"), Some("130.0000"));
    }

    #[test]
    fn specificity_weighting_avoids_interfered_transitions() {
        // AAA's strongest transition collides with BBB in both m/z and RT;
        // with full specificity weight the clean weaker one wins.
        let dir = TempDir::new().unwrap();
        let path = write_library(
            &dir,
            "InChIKey,precursor_mz,product_mz,rt,intensity\n\
             AAA,180.0,110.0,3.0,900\n\
             AAA,180.0,150.0,3.0,500\n\
             BBB,200.0,110.2,3.5,800\n",
        );
        let mut optimizer = LibraryOptimizer::new(&config(1.0), &path);
        optimizer.load_all_data().unwrap();
        let record = optimizer.process_compound("AAA").unwrap().unwrap();
        assert_eq!(record.get("product_mz"), Some("150.0000"));
    }

    #[test]
    fn rt_offset_is_applied_to_the_reported_rt() {
        let dir = TempDir::new().unwrap();
        let path = write_library(
            &dir,
            "InChIKey,precursor_mz,product_mz,rt,intensity\nAAA,180.0,110.0,3.0,500\n",
        );
        let mut cfg = config(0.2);
        cfg.rt_offset = 0.5;
        let mut optimizer = LibraryOptimizer::new(&cfg, &path);
        optimizer.load_all_data().unwrap();
        let record = optimizer.process_compound("AAA").unwrap().unwrap();
        assert_eq!(record.get("rt"), Some("3.50"));
    }
}
