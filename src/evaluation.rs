//! Ground-truth scoring of reconciled answers.
//!
//! Keys are normalized like schema field names; values are compared after
//! trimming and lowercasing. A ground-truth key the answers lack counts as
//! incorrect and is also listed as missing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::form::normalize_name;
use crate::reconcile::ReconciledAnswers;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Ground truth JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Expected answers keyed by normalized field name; `None` means the field
/// should stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GroundTruth {
    fields: BTreeMap<String, Option<String>>,
}

impl GroundTruth {
    pub fn from_json_str(json: &str) -> Result<Self, EvaluationError> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let fields = raw
            .into_iter()
            .map(|(name, value)| {
                let expected = match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
                (normalize_name(&name), expected)
            })
            .collect();
        Ok(Self { fields })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EvaluationError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn insert(&mut self, name: &str, expected: Option<&str>) {
        self.fields
            .insert(normalize_name(name), expected.map(str::to_string));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: Option<String>,
    pub got: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Percentage of ground-truth fields answered correctly, two decimals.
    pub accuracy: f64,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub total_fields: usize,
    pub correct_fields: Vec<String>,
    pub incorrect_fields: Vec<FieldMismatch>,
    pub missing_fields: Vec<String>,
    /// Fields answered although the truth is empty.
    pub hallucinations: Vec<String>,
    /// Hallucinations over empty-truth fields, three decimals.
    pub hallucination_rate: f64,
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_lowercase())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn evaluate(answers: &ReconciledAnswers, truth: &GroundTruth) -> EvaluationReport {
    let mut report = EvaluationReport {
        total_fields: truth.len(),
        ..Default::default()
    };
    let mut empty_truths = 0usize;

    for (field, expected) in &truth.fields {
        if expected.is_none() {
            empty_truths += 1;
        }

        if !answers.contains(field) {
            report.missing_fields.push(field.clone());
            report.incorrect_count += 1;
            continue;
        }

        let got = answers.component(field);
        if expected.is_none() && got.is_some() {
            report.hallucinations.push(field.clone());
        }

        if normalize(expected.as_deref()) == normalize(got.as_deref()) {
            report.correct_count += 1;
            report.correct_fields.push(field.clone());
        } else {
            report.incorrect_count += 1;
            report.incorrect_fields.push(FieldMismatch {
                field: field.clone(),
                expected: expected.clone(),
                got,
            });
        }
    }

    if report.total_fields > 0 {
        let ratio = report.correct_count as f64 / report.total_fields as f64;
        report.accuracy = round_to(ratio * 100.0, 2);
    }
    if empty_truths > 0 {
        let ratio = report.hallucinations.len() as f64 / empty_truths as f64;
        report.hallucination_rate = round_to(ratio, 3);
    }

    tracing::info!(
        accuracy = report.accuracy,
        correct = report.correct_count,
        total = report.total_fields,
        missing = report.missing_fields.len(),
        hallucination_rate = report.hallucination_rate,
        "Evaluation complete"
    );
    report
}
