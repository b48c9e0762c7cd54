//! Patient records and loading them from CSV exports.
//!
//! A patient is an open-ended set of scalar attributes. Nothing here
//! interprets the attributes; they are serialized into the prompt as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Attribute names checked, in order, for a patient identifier.
pub const ID_ATTRIBUTES: [&str; 2] = ["patient_id", "subject_id"];

/// Errors from building or loading patient records.
#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Failed to read patient file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse patient CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse patient JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Patient JSON must be an object")]
    NotAnObject,

    #[error("Attribute '{0}' is not a scalar value")]
    NonScalar(String),
}

/// A single scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatientValue {
    Flag(bool),
    Number(Number),
    Text(String),
}

impl PatientValue {
    /// Infer a typed value from a raw CSV cell.
    ///
    /// `true`/`false` (any case) become flags, integers and finite floats
    /// become numbers, everything else stays text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return PatientValue::Flag(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return PatientValue::Flag(false);
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return PatientValue::Number(n.into());
        }
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return PatientValue::Number(n);
        }
        PatientValue::Text(trimmed.to_string())
    }

    fn from_json(key: &str, value: JsonValue) -> Result<Option<Self>, PatientError> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::Bool(b) => Ok(Some(PatientValue::Flag(b))),
            JsonValue::Number(n) => Ok(Some(PatientValue::Number(n))),
            JsonValue::String(s) => Ok(Some(PatientValue::Text(s))),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Err(PatientError::NonScalar(key.to_string()))
            }
        }
    }
}

impl std::fmt::Display for PatientValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatientValue::Flag(b) => write!(f, "{b}"),
            PatientValue::Number(n) => write!(f, "{n}"),
            PatientValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PatientValue {
    fn from(value: bool) -> Self {
        PatientValue::Flag(value)
    }
}

impl From<i32> for PatientValue {
    fn from(value: i32) -> Self {
        PatientValue::Number(value.into())
    }
}

impl From<i64> for PatientValue {
    fn from(value: i64) -> Self {
        PatientValue::Number(value.into())
    }
}

impl From<f64> for PatientValue {
    /// Non-finite floats have no JSON form and are kept as text.
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(PatientValue::Number)
            .unwrap_or_else(|| PatientValue::Text(value.to_string()))
    }
}

impl From<&str> for PatientValue {
    fn from(value: &str) -> Self {
        PatientValue::Text(value.to_string())
    }
}

impl From<String> for PatientValue {
    fn from(value: String) -> Self {
        PatientValue::Text(value)
    }
}

/// A patient's attributes keyed by name.
///
/// Keys are kept sorted so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRecord {
    attributes: BTreeMap<String, PatientValue>,
}

impl PatientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PatientValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PatientValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PatientValue> {
        self.attributes.get(key)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatientValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The patient's identifier, from `patient_id` or `subject_id`.
    pub fn patient_id(&self) -> Option<String> {
        ID_ATTRIBUTES.iter().find_map(|key| {
            let id = self.get(key)?.to_string();
            (!id.trim().is_empty()).then_some(id)
        })
    }

    /// Parse a record from a JSON object of scalars. Null values are dropped.
    pub fn from_json_str(json: &str) -> Result<Self, PatientError> {
        let value: JsonValue = serde_json::from_str(json)?;
        match value {
            JsonValue::Object(map) => Self::from_json_map(map),
            _ => Err(PatientError::NotAnObject),
        }
    }

    fn from_json_map(map: Map<String, JsonValue>) -> Result<Self, PatientError> {
        let mut record = Self::new();
        for (key, value) in map {
            if let Some(v) = PatientValue::from_json(&key, value)? {
                record.attributes.insert(key, v);
            }
        }
        Ok(record)
    }

    /// Indented JSON used inside the screening prompt.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load patients from a CSV file with a header row.
pub fn load_patients_csv(path: impl AsRef<Path>) -> Result<Vec<PatientRecord>, PatientError> {
    let path = path.as_ref();
    let patients = read_patients_csv(File::open(path)?)?;
    tracing::info!(path = %path.display(), count = patients.len(), "Loaded patients");
    Ok(patients)
}

/// Read patients from any CSV source. Empty cells are omitted from the record.
pub fn read_patients_csv<R: Read>(reader: R) -> Result<Vec<PatientRecord>, PatientError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut patients = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let mut record = PatientRecord::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() || cell.is_empty() {
                continue;
            }
            record.insert(header, PatientValue::infer(cell));
        }
        patients.push(record);
    }

    Ok(patients)
}
