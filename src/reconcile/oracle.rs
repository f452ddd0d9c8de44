//! Extraction oracle capability: given the schema and the source evidence,
//! propose candidates per field. The proposer itself (a model, a rules
//! engine, a human) lives outside this crate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::{CandidateSet, SourceTag};
use super::ReconcileError;
use crate::form::FormSchema;

/// Raw evidence handed to the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBundle {
    /// S1: document text (layout/OCR output).
    pub document_text: String,
    /// S2: free-text clinical notes.
    pub clinical_notes: String,
    /// S3: structured demographic record.
    pub demographics: serde_json::Value,
}

impl SourceBundle {
    pub fn new(document_text: &str, clinical_notes: &str, demographics: serde_json::Value) -> Self {
        Self {
            document_text: document_text.to_string(),
            clinical_notes: clinical_notes.to_string(),
            demographics,
        }
    }

    /// Read the three sources from disk; the demographic record must be JSON.
    pub fn load(
        document_text: &Path,
        clinical_notes: &Path,
        demographics: &Path,
    ) -> Result<Self, ReconcileError> {
        let document_text = std::fs::read_to_string(document_text)?;
        let clinical_notes = std::fs::read_to_string(clinical_notes)?;
        let raw = std::fs::read_to_string(demographics)?;
        let demographics = serde_json::from_str(&raw).map_err(|e| {
            ReconcileError::Oracle(format!("demographic record is not valid JSON: {e}"))
        })?;
        Ok(Self {
            document_text,
            clinical_notes,
            demographics,
        })
    }

    /// Source content as text, for oracles that work on plain strings.
    pub fn text_of(&self, source: SourceTag) -> String {
        match source {
            SourceTag::S1 => self.document_text.clone(),
            SourceTag::S2 => self.clinical_notes.clone(),
            SourceTag::S3 => serde_json::to_string_pretty(&self.demographics).unwrap_or_default(),
        }
    }
}

pub trait ExtractionOracle: Send + Sync {
    /// Identifier recorded in run logs.
    fn name(&self) -> &str;

    /// Propose candidates for the schema's fields from the sources.
    fn propose(
        &self,
        schema: &FormSchema,
        sources: &SourceBundle,
    ) -> Result<CandidateSet, ReconcileError>;
}

/// Replays a previously captured oracle output.
#[derive(Debug, Clone)]
pub struct RecordedOracle {
    label: String,
    candidates: CandidateSet,
}

impl RecordedOracle {
    pub fn new(candidates: CandidateSet) -> Self {
        Self {
            label: "recorded".to_string(),
            candidates,
        }
    }

    /// Parse captured oracle text (bare JSON or JSON wrapped in prose).
    pub fn from_text(text: &str) -> Result<Self, ReconcileError> {
        Ok(Self::new(CandidateSet::from_oracle_text(text)?))
    }

    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        let raw = std::fs::read_to_string(path)?;
        let mut oracle = Self::from_text(&raw)?;
        oracle.label = format!("recorded:{}", path.display());
        Ok(oracle)
    }
}

impl ExtractionOracle for RecordedOracle {
    fn name(&self) -> &str {
        &self.label
    }

    fn propose(
        &self,
        schema: &FormSchema,
        _sources: &SourceBundle,
    ) -> Result<CandidateSet, ReconcileError> {
        tracing::debug!(
            oracle = %self.label,
            fields = self.candidates.len(),
            schema_fields = schema.len(),
            "Replaying recorded candidates"
        );
        Ok(self.candidates.clone())
    }
}
