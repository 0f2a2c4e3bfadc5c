//! Optimizer collaborator boundary.
//!
//! The calculation pipeline drives an optimizer through this trait and never
//! looks inside the records it produces. [`LibraryOptimizer`] is the
//! reference-library-backed implementation shipped with the tool.

mod library;
mod scoring;

#[cfg(test)]
pub(crate) mod mock;

pub use library::LibraryOptimizer;

use crate::model::ResultRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("failed to load reference data: {0}")]
    DataLoad(String),
    #[error("compound {inchikey} failed: {message}")]
    Compute { inchikey: String, message: String },
}

/// External optimization engine, one instance per run.
///
/// `load_all_data` must be called before anything else; after it returns the
/// optimizer knows which identifiers it can resolve.
pub trait CompoundOptimizer: Send {
    /// Load the reference dataset and match it against the run's input.
    fn load_all_data(&mut self) -> Result<(), OptimizerError>;

    /// Identifiers the loaded dataset can resolve, unique, in natural order.
    fn resolvable_identifiers(&self) -> &[String];

    /// Compute tuned transition parameters for one compound. `Ok(None)`
    /// means the compound is unknown to the dataset and is skipped silently.
    fn process_compound(&self, inchikey: &str) -> Result<Option<ResultRecord>, OptimizerError>;
}
