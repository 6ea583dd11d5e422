//! Extraction ledger — append-only provenance for derived fields.
//!
//! Every structured field an agent derives is recorded with where it came
//! from. The current value of each field is a fold over the ledger (latest
//! write wins), cached until the next append.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a derived value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    UserInput,
    ExternalLookup,
    Inference,
    UserConfirmation,
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserInput => "user_input",
            Self::ExternalLookup => "external_lookup",
            Self::Inference => "inference",
            Self::UserConfirmation => "user_confirmation",
        };
        write!(f, "{s}")
    }
}

/// One derived field. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub field: String,
    pub value: serde_json::Value,
    /// Message the value was derived from.
    pub message_id: Uuid,
    pub source: ExtractionSource,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only list of extraction records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionLedger {
    records: Vec<ExtractionRecord>,
    #[serde(skip)]
    projection: OnceLock<BTreeMap<String, serde_json::Value>>,
}

impl ExtractionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and invalidate the cached projection.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        value: serde_json::Value,
        message_id: Uuid,
        source: ExtractionSource,
    ) -> &ExtractionRecord {
        self.records.push(ExtractionRecord {
            field: field.into(),
            value,
            message_id,
            source,
            timestamp: Utc::now(),
        });
        self.projection = OnceLock::new();
        &self.records[self.records.len() - 1]
    }

    /// Current value per field.
    pub fn extracted_fields(&self) -> &BTreeMap<String, serde_json::Value> {
        self.projection.get_or_init(|| fold(&self.records))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.extracted_fields().contains_key(field)
    }

    pub fn get_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.extracted_fields().get(field)
    }

    /// Most recent record for a field, with its provenance.
    pub fn latest(&self, field: &str) -> Option<&ExtractionRecord> {
        self.records.iter().rev().find(|r| r.field == field)
    }

    /// Full history of one field, oldest first.
    pub fn history(&self, field: &str) -> Vec<&ExtractionRecord> {
        self.records.iter().filter(|r| r.field == field).collect()
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn fold(records: &[ExtractionRecord]) -> BTreeMap<String, serde_json::Value> {
    records.iter().fold(BTreeMap::new(), |mut acc, r| {
        acc.insert(r.field.clone(), r.value.clone());
        acc
    })
}
