//! Diagnostics produced alongside the reconciled answers. Nothing in here
//! is fatal; fatal findings are raised as `ReconcileError` instead.

use serde::Serialize;

use super::types::SourceTag;
use crate::validation::{AddressValidation, AreaCodeLookup, DateTripletOutcome};

/// How the answer for a field was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// The oracle supplied a single resolved candidate.
    OracleChoice,
    /// Highest-priority source with a non-null value.
    SourcePriority,
    /// Highest confidence among several candidates.
    HighestConfidence,
    /// No candidate at all; answered null.
    NoCandidate,
}

impl SelectionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OracleChoice => "oracle_choice",
            Self::SourcePriority => "source_priority",
            Self::HighestConfidence => "highest_confidence",
            Self::NoCandidate => "no_candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSelection {
    pub field: String,
    pub rule: SelectionRule,
    pub chosen: Option<SourceTag>,
    /// Highest-priority source with evidence for this field, per the priority table.
    pub preferred: Option<SourceTag>,
    pub confidence: f64,
}

impl SourceSelection {
    /// Chosen source differs from the table's preference.
    pub fn deviates(&self) -> bool {
        matches!((self.chosen, self.preferred), (Some(c), Some(p)) if c != p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ContractIssue {
    /// Non-null value with no supporting citation.
    MissingCitations,
    ConfidenceOutOfRange { confidence: f64 },
    /// Null value reported with a non-zero confidence.
    NullWithConfidence { confidence: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractWarning {
    pub field: String,
    #[serde(flatten)]
    pub issue: ContractIssue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaCodeCheck {
    pub field: String,
    pub area_code: String,
    pub lookup: AreaCodeLookup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCheck {
    pub prefix: String,
    pub outcome: DateTripletOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCheck {
    pub field: String,
    pub result: AddressValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub fields_total: usize,
    pub answered: usize,
    /// Schema fields the oracle returned nothing for (answered null).
    pub missing_candidates: Vec<String>,
    pub selections: Vec<SourceSelection>,
    pub area_codes: Vec<AreaCodeCheck>,
    pub dates: Vec<DateCheck>,
    pub addresses: Vec<AddressCheck>,
    pub warnings: Vec<ContractWarning>,
}

impl ReconciliationReport {
    pub fn null_answers(&self) -> usize {
        self.fields_total.saturating_sub(self.answered)
    }

    pub fn priority_deviations(&self) -> impl Iterator<Item = &SourceSelection> {
        self.selections.iter().filter(|s| s.deviates())
    }

    pub fn selection(&self, field: &str) -> Option<&SourceSelection> {
        self.selections.iter().find(|s| s.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_selection(chosen: Option<SourceTag>, preferred: Option<SourceTag>) -> SourceSelection {
        SourceSelection {
            field: "hand".into(),
            rule: SelectionRule::OracleChoice,
            chosen,
            preferred,
            confidence: 0.9,
        }
    }

    #[test]
    fn deviation_needs_both_sources() {
        assert!(make_selection(Some(SourceTag::S1), Some(SourceTag::S3)).deviates());
        assert!(!make_selection(Some(SourceTag::S3), Some(SourceTag::S3)).deviates());
        assert!(!make_selection(None, Some(SourceTag::S3)).deviates());
        assert!(!make_selection(Some(SourceTag::S1), None).deviates());
    }

    #[test]
    fn warnings_serialize_flat() {
        let warning = ContractWarning {
            field: "dose1".into(),
            issue: ContractIssue::ConfidenceOutOfRange { confidence: 1.5 },
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"field": "dose1", "issue": "confidence_out_of_range", "confidence": 1.5})
        );
    }

    #[test]
    fn null_answer_count() {
        let report = ReconciliationReport {
            fields_total: 5,
            answered: 3,
            ..Default::default()
        };
        assert_eq!(report.null_answers(), 2);
        assert_eq!(report.priority_deviations().count(), 0);
    }
}
