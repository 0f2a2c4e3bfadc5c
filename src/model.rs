use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

/// Hard cap on compounds processed per batch run.
pub const MAX_COMPOUNDS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub mz_tolerance: f64,
    pub rt_tolerance: f64,
    pub rt_offset: f64,
    pub specificity_weight: f64,
    pub max_compounds: usize,
    pub output_path: PathBuf,
    pub mode: RunMode,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Run mode. The target key lives inside the `Single` variant, so a
/// single-compound config without a target cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Single { inchikey: String },
    Batch,
}

impl RunMode {
    pub fn is_single(&self) -> bool {
        matches!(self, RunMode::Single { .. })
    }
}

/// What to do when the optimizer fails on one compound mid-batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the run and discard everything accumulated so far.
    #[default]
    Abort,
    /// Skip the failing compound and keep going.
    Skip,
}

/// Ingested input, produced once per upload and never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputBatch {
    Single {
        inchikey: String,
    },
    Table {
        identifiers: Vec<String>,
        source_name: String,
        record_count: usize,
    },
}

impl InputBatch {
    pub fn identifiers(&self) -> &[String] {
        match self {
            InputBatch::Single { inchikey } => std::slice::from_ref(inchikey),
            InputBatch::Table { identifiers, .. } => identifiers,
        }
    }
}

/// Snapshot of a running or finished calculation, readable by any observer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub percent: u8,
    pub running: bool,
    pub complete: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One optimized transition as returned by the optimizer.
///
/// The field set is optimizer-defined; the pipeline carries it as an ordered
/// list of (name, value) pairs and never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    fields: Vec<(String, String)>,
}

impl ResultRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(_, v)| v.as_str())
    }
}

// Serialized as a map so exports keep the optimizer's field order and names.
impl Serialize for ResultRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = ResultRecord;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of result fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, String>()? {
                    fields.push(entry);
                }
                Ok(ResultRecord::new(fields))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// The persisted/auto-saved shape of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub timestamp_utc: String,
    pub run_id: String,
    pub config: RunConfig,
    pub record_count: usize,
    pub results: Vec<ResultRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ResultRecord {
        ResultRecord::new(vec![
            ("InChIKey".into(), "KXRPCFINVWWFHQ-UHFFFAOYSA-N".into()),
            ("precursor_mz".into(), "180.0634".into()),
            ("score".into(), "0.91".into()),
        ])
    }

    #[test]
    fn result_record_serializes_in_field_order() {
        let json = serde_json::to_string(&record()).unwrap();
        assert_eq!(
            json,
            r#"{"InChIKey":"KXRPCFINVWWFHQ-UHFFFAOYSA-N","precursor_mz":"180.0634","score":"0.91"}"#
        );
    }

    #[test]
    fn result_record_roundtrips_through_json() {
        let original = record();
        let json = serde_json::to_string(&original).unwrap();
        let back: ResultRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn single_mode_carries_its_target() {
        let mode = RunMode::Single {
            inchikey: "KXRPCFINVWWFHQ-UHFFFAOYSA-N".into(),
        };
        assert!(mode.is_single());
        assert!(!RunMode::Batch.is_single());
    }

    #[test]
    fn batch_identifiers_preserve_order_and_duplicates() {
        let batch = InputBatch::Table {
            identifiers: vec!["b".into(), "a".into(), "b".into()],
            source_name: "input.txt".into(),
            record_count: 3,
        };
        assert_eq!(batch.identifiers(), ["b", "a", "b"]);
    }
}
