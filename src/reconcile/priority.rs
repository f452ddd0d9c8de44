//! Per-field source reliability ordering, highest priority first.
//!
//! Identity and contact data is most reliable in the demographic record,
//! clinical content in the notes, administrative fields on the document.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use super::types::SourceTag;
use super::types::SourceTag::{S1, S2, S3};
use super::ReconcileError;
use crate::form::normalize_name;

const IDENTITY: [SourceTag; 3] = [S3, S2, S1];
const ADMINISTRATIVE: [SourceTag; 3] = [S1, S3, S2];
const MEDICATION: [SourceTag; 3] = [S2, S3, S1];
const CLINICAL: [SourceTag; 3] = [S2, S1, S3];
const DOCUMENT_FIRST: [SourceTag; 3] = [S1, S2, S3];

const DEFAULT_PRIORITIES: &[(&str, [SourceTag; 3])] = &[
    ("first name", IDENTITY),
    ("areacode", IDENTITY),
    ("phonea", IDENTITY),
    ("phoneb", IDENTITY),
    ("areacode1", IDENTITY),
    ("phonea1", IDENTITY),
    ("phoneb1", IDENTITY),
    ("address", IDENTITY),
    ("employer name", ADMINISTRATIVE),
    ("company_name", ADMINISTRATIVE),
    ("contract", ADMINISTRATIVE),
    ("cert", ADMINISTRATIVE),
    ("date_of_birth_d", IDENTITY),
    ("date_of_birth_m", IDENTITY),
    ("date_of_birth_y", IDENTITY),
    ("date_last_d", DOCUMENT_FIRST),
    ("date_last_m", DOCUMENT_FIRST),
    ("date_last_y", DOCUMENT_FIRST),
    ("date_return_d", DOCUMENT_FIRST),
    ("date_return_m", DOCUMENT_FIRST),
    ("date_return_y", DOCUMENT_FIRST),
    ("medication1", MEDICATION),
    ("medication2", MEDICATION),
    ("medication3", MEDICATION),
    ("medication4", MEDICATION),
    ("medication5", MEDICATION),
    ("dose1", MEDICATION),
    ("dose2", MEDICATION),
    ("dose3", MEDICATION),
    ("dose4", MEDICATION),
    ("dose5", MEDICATION),
    ("often1", MEDICATION),
    ("often2", MEDICATION),
    ("often3", MEDICATION),
    ("often4", MEDICATION),
    ("often5", MEDICATION),
    ("height", CLINICAL),
    ("weight", CLINICAL),
    ("hand", IDENTITY),
    ("doctor", DOCUMENT_FIRST),
    ("doctor_other", DOCUMENT_FIRST),
    ("diagnosis_primary1", CLINICAL),
    ("diagnosis_primary2", CLINICAL),
    ("diagnosis_secondary1", CLINICAL),
    ("diagnosis_secondary2", CLINICAL),
    ("date_childbirth_d", DOCUMENT_FIRST),
    ("date_childbirth_m", DOCUMENT_FIRST),
    ("date_childbirth_y", DOCUMENT_FIRST),
    ("delivery", DOCUMENT_FIRST),
];

/// Immutable once built; pass it to the engine explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourcePriorityTable {
    order: BTreeMap<String, Vec<SourceTag>>,
}

impl Default for SourcePriorityTable {
    fn default() -> Self {
        Self {
            order: DEFAULT_PRIORITIES
                .iter()
                .map(|(name, order)| (name.to_string(), order.to_vec()))
                .collect(),
        }
    }
}

impl SourcePriorityTable {
    pub fn empty() -> Self {
        Self {
            order: BTreeMap::new(),
        }
    }

    /// Build from explicit orderings, rejecting empty or repeating ones.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = (S, Vec<SourceTag>)>,
        S: AsRef<str>,
    {
        let mut order = BTreeMap::new();
        for (name, sources) in entries {
            let name = normalize_name(name.as_ref());
            check_ordering(&name, &sources)?;
            if order.insert(name.clone(), sources).is_some() {
                return Err(ReconcileError::PriorityTable(format!(
                    "field '{name}' listed twice"
                )));
            }
        }
        Ok(Self { order })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ReconcileError> {
        let entries: BTreeMap<String, Vec<SourceTag>> = serde_json::from_str(raw)
            .map_err(|e| ReconcileError::PriorityTable(e.to_string()))?;
        Self::from_entries(entries)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ReconcileError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Overlay `overrides` on top of this table.
    pub fn merged(mut self, overrides: SourcePriorityTable) -> Self {
        self.order.extend(overrides.order);
        self
    }

    pub fn get(&self, field: &str) -> Option<&[SourceTag]> {
        self.order.get(field).map(Vec::as_slice)
    }

    /// Position of `source` in the field's ordering (0 = most trusted).
    pub fn rank(&self, field: &str, source: SourceTag) -> Option<usize> {
        self.get(field)?.iter().position(|s| *s == source)
    }

    /// Highest-priority source among `available`, if the field has an ordering.
    pub fn preferred_among(&self, field: &str, available: &[SourceTag]) -> Option<SourceTag> {
        self.get(field)?
            .iter()
            .copied()
            .find(|s| available.contains(s))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn check_ordering(name: &str, sources: &[SourceTag]) -> Result<(), ReconcileError> {
    if sources.is_empty() {
        return Err(ReconcileError::PriorityTable(format!(
            "field '{name}' has an empty source ordering"
        )));
    }
    for (i, source) in sources.iter().enumerate() {
        if sources[..i].contains(source) {
            return Err(ReconcileError::PriorityTable(format!(
                "field '{name}' lists {source} twice"
            )));
        }
    }
    Ok(())
}
