//! Scripted optimizer for runner, session and pipeline tests.

use super::{CompoundOptimizer, OptimizerError};
use crate::model::ResultRecord;
use crate::progress::ProgressCell;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-compound scripted behavior.
pub(crate) enum Behavior {
    Record,
    Empty,
    Fail(String),
}

/// A [`CompoundOptimizer`] driven by a script instead of a library file.
///
/// Records every `process_compound` call, and can snapshot an observed
/// [`ProgressCell`] at call time so tests can assert the emitted sequence.
pub(crate) struct ScriptedOptimizer {
    identifiers: Vec<String>,
    behaviors: HashMap<String, Behavior>,
    load_error: Option<String>,
    calls: Mutex<Vec<String>>,
    observe: Option<ProgressCell>,
    percents_seen: Mutex<Vec<u8>>,
}

impl ScriptedOptimizer {
    pub(crate) fn new(identifiers: &[&str]) -> Self {
        Self {
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            behaviors: HashMap::new(),
            load_error: None,
            calls: Mutex::new(Vec::new()),
            observe: None,
            percents_seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn behavior(mut self, inchikey: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(inchikey.to_string(), behavior);
        self
    }

    pub(crate) fn failing_load(mut self, message: &str) -> Self {
        self.load_error = Some(message.to_string());
        self
    }

    pub(crate) fn observing(mut self, progress: ProgressCell) -> Self {
        self.observe = Some(progress);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn percents_seen(&self) -> Vec<u8> {
        self.percents_seen.lock().unwrap().clone()
    }

    fn record_for(inchikey: &str) -> ResultRecord {
        ResultRecord::new(vec![
            ("InChIKey".into(), inchikey.to_string()),
            ("product_mz".into(), "110.0000".into()),
            ("score".into(), "0.9000".into()),
        ])
    }
}

impl CompoundOptimizer for ScriptedOptimizer {
    fn load_all_data(&mut self) -> Result<(), OptimizerError> {
        match &self.load_error {
            Some(message) => Err(OptimizerError::DataLoad(message.clone())),
            None => Ok(()),
        }
    }

    fn resolvable_identifiers(&self) -> &[String] {
        &self.identifiers
    }

    fn process_compound(&self, inchikey: &str) -> Result<Option<ResultRecord>, OptimizerError> {
        self.calls.lock().unwrap().push(inchikey.to_string());
        if let Some(progress) = &self.observe {
            self.percents_seen
                .lock()
                .unwrap()
                .push(progress.snapshot().percent);
        }
        match self.behaviors.get(inchikey) {
            Some(Behavior::Empty) => Ok(None),
            Some(Behavior::Fail(message)) => Err(OptimizerError::Compute {
                inchikey: inchikey.to_string(),
                message: message.clone(),
            }),
            Some(Behavior::Record) | None => Ok(Some(Self::record_for(inchikey))),
        }
    }
}
