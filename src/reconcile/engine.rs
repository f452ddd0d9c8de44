//! Reconciliation engine: merges oracle candidates into validated answers.
//!
//! Pipeline per run:
//! 1. Integrity: the candidate key set must match the schema
//! 2. Selection: one candidate per field (oracle choice, or source priority in strict mode)
//! 3. Contract audit: soft warnings for uncited values and odd confidences
//! 4. Validation: phone groups, date triplets, addresses; first failure aborts
//! 5. Final count check against the schema

use std::sync::Arc;

use chrono::NaiveDate;

use super::classes::{DateTriplet, FieldClasses, PhoneGroup};
use super::priority::SourcePriorityTable;
use super::report::{
    AddressCheck, AreaCodeCheck, ContractIssue, ContractWarning, DateCheck, ReconciliationReport,
    SelectionRule, SourceSelection,
};
use super::types::{Candidate, CandidateSet, ReconciledAnswers, SourceTag};
use super::ReconcileError;
use crate::config::{AreaCodePolicy, FormFillConfig, PriorityPolicy};
use crate::form::FormSchema;
use crate::validation::{
    self, validate_address, validate_area_code, validate_calendar_triplet, validate_date_triplet,
    validate_segment, DateTripletOutcome, Gazetteer, NanpPlan, NumberingPlan, PhoneSegment,
    ValidationError,
};

/// Answers plus the diagnostics gathered while producing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub answers: ReconciledAnswers,
    pub report: ReconciliationReport,
}

pub struct ReconciliationEngine {
    config: FormFillConfig,
    priorities: SourcePriorityTable,
    plan: Arc<dyn NumberingPlan>,
    gazetteer: Option<Arc<dyn Gazetteer>>,
    classes: Option<FieldClasses>,
    today: NaiveDate,
}

impl ReconciliationEngine {
    /// Engine with the default priority table and the built-in NANP plan.
    pub fn new(config: FormFillConfig) -> Self {
        Self {
            config,
            priorities: SourcePriorityTable::default(),
            plan: Arc::new(NanpPlan),
            gazetteer: None,
            classes: None,
            today: validation::date::today(),
        }
    }

    pub fn with_priorities(mut self, priorities: SourcePriorityTable) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_numbering_plan(mut self, plan: Arc<dyn NumberingPlan>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_gazetteer(mut self, gazetteer: Arc<dyn Gazetteer>) -> Self {
        self.gazetteer = Some(gazetteer);
        self
    }

    /// Use fixed field classes instead of detecting them per schema.
    pub fn with_classes(mut self, classes: FieldClasses) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Reference date for future-date and age checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &FormFillConfig {
        &self.config
    }

    pub fn priorities(&self) -> &SourcePriorityTable {
        &self.priorities
    }

    pub fn classes_for(&self, schema: &FormSchema) -> FieldClasses {
        self.classes
            .clone()
            .unwrap_or_else(|| FieldClasses::detect(schema, &self.config.address_fields))
    }

    pub fn reconcile(
        &self,
        schema: &FormSchema,
        candidates: &CandidateSet,
    ) -> Result<Reconciliation, ReconcileError> {
        let missing = self.check_integrity(schema, candidates)?;

        let mut report = ReconciliationReport {
            fields_total: schema.len(),
            missing_candidates: missing,
            ..Default::default()
        };
        let mut answers = ReconciledAnswers::default();

        for name in schema.names() {
            let Some(list) = candidates.get(name).filter(|l| !l.is_empty()) else {
                answers.insert(name, None);
                report.selections.push(SourceSelection {
                    field: name.to_string(),
                    rule: SelectionRule::NoCandidate,
                    chosen: None,
                    preferred: None,
                    confidence: 0.0,
                });
                continue;
            };

            for candidate in list {
                audit_contract(name, candidate, &mut report.warnings);
            }

            let (chosen, selection) = self.select(name, list);
            if selection.deviates() {
                tracing::debug!(
                    field = %name,
                    chosen = ?selection.chosen,
                    preferred = ?selection.preferred,
                    "Chosen source differs from priority table"
                );
            }
            answers.insert(name, chosen.value.clone());
            report.selections.push(selection);
        }

        let classes = self.classes_for(schema);
        for group in &classes.phone_groups {
            self.check_phone_group(group, &answers, &mut report)?;
        }
        for field in &classes.area_codes {
            self.check_area_code(field, &answers, &mut report)?;
        }
        for triplet in &classes.date_triplets {
            self.check_date_triplet(triplet, &answers, &mut report)?;
        }
        self.check_addresses(&classes.address_fields, &answers, &mut report)?;

        if answers.len() != schema.len() {
            return Err(ReconcileError::SchemaIntegrity(format!(
                "{} answers for a {}-field schema",
                answers.len(),
                schema.len()
            )));
        }

        report.answered = answers.answered();
        tracing::info!(
            fields = report.fields_total,
            answered = report.answered,
            missing = report.missing_candidates.len(),
            warnings = report.warnings.len(),
            deviations = report.priority_deviations().count(),
            "Reconciliation complete"
        );
        Ok(Reconciliation { answers, report })
    }

    // ═══════════════════════════════════════════
    // Integrity
    // ═══════════════════════════════════════════

    /// Returns the schema fields with no candidate (allowed only when configured).
    fn check_integrity(
        &self,
        schema: &FormSchema,
        candidates: &CandidateSet,
    ) -> Result<Vec<String>, ReconcileError> {
        let invented: Vec<&str> = candidates.names().filter(|n| !schema.contains(n)).collect();
        if !invented.is_empty() {
            return Err(ReconcileError::SchemaIntegrity(format!(
                "oracle returned {} fields for a {}-field schema; unknown fields: {}",
                candidates.len(),
                schema.len(),
                invented.join(", ")
            )));
        }

        let missing: Vec<String> = schema
            .names()
            .filter(|n| !candidates.contains(n))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            if !self.config.allow_missing_candidates {
                return Err(ReconcileError::SchemaIntegrity(format!(
                    "oracle returned {} fields for a {}-field schema; missing: {}",
                    candidates.len(),
                    schema.len(),
                    missing.join(", ")
                )));
            }
            tracing::warn!(
                count = missing.len(),
                fields = %missing.join(", "),
                "Fields without candidates answered null"
            );
        }
        Ok(missing)
    }

    // ═══════════════════════════════════════════
    // Selection
    // ═══════════════════════════════════════════

    fn select<'c>(&self, field: &str, list: &'c [Candidate]) -> (&'c Candidate, SourceSelection) {
        let non_null: Vec<&Candidate> = list.iter().filter(|c| !c.is_null()).collect();
        let rank = |c: &Candidate| {
            c.primary_source()
                .and_then(|s| self.priorities.rank(field, s))
                .unwrap_or(usize::MAX)
        };

        let (chosen, rule) = match (list, self.config.priority_policy) {
            ([only], _) => (only, SelectionRule::OracleChoice),
            (_, _) if non_null.is_empty() => (&list[0], SelectionRule::HighestConfidence),
            (_, PriorityPolicy::Strict) => {
                let best = non_null
                    .iter()
                    .copied()
                    .min_by(|a, b| {
                        rank(*a)
                            .cmp(&rank(*b))
                            .then_with(|| b.confidence.total_cmp(&a.confidence))
                    })
                    .unwrap_or(&list[0]);
                let rule = if rank(best) == usize::MAX {
                    SelectionRule::HighestConfidence
                } else {
                    SelectionRule::SourcePriority
                };
                (best, rule)
            }
            (_, PriorityPolicy::Advisory) => {
                let best = non_null
                    .iter()
                    .copied()
                    .min_by(|a, b| {
                        b.confidence
                            .total_cmp(&a.confidence)
                            .then_with(|| rank(*a).cmp(&rank(*b)))
                    })
                    .unwrap_or(&list[0]);
                (best, SelectionRule::HighestConfidence)
            }
        };

        let available: Vec<SourceTag> = if list.len() == 1 {
            if chosen.is_null() {
                Vec::new()
            } else {
                chosen.cited_sources()
            }
        } else {
            let mut sources = Vec::new();
            for tag in non_null.iter().filter_map(|c| c.primary_source()) {
                if !sources.contains(&tag) {
                    sources.push(tag);
                }
            }
            sources
        };

        let selection = SourceSelection {
            field: field.to_string(),
            rule,
            chosen: if chosen.is_null() { None } else { chosen.primary_source() },
            preferred: self.priorities.preferred_among(field, &available),
            confidence: chosen.confidence,
        };
        (chosen, selection)
    }

    // ═══════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════

    fn check_phone_group(
        &self,
        group: &PhoneGroup,
        answers: &ReconciledAnswers,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconcileError> {
        let segments = [
            (PhoneSegment::AreaCode, group.area_code.as_str()),
            (PhoneSegment::FirstGroup, group.first.as_str()),
            (PhoneSegment::SecondGroup, group.second.as_str()),
        ];
        let values: Vec<Option<String>> = segments
            .iter()
            .map(|(_, field)| answers.component(field))
            .collect();

        if values.iter().all(Option::is_none) {
            tracing::debug!(field = %group.area_code, "Phone group empty, skipped");
            return Ok(());
        }

        for ((segment, field), value) in segments.iter().zip(&values) {
            validate_segment(*segment, value.as_deref()).map_err(|e| {
                ReconcileError::InvalidFormat {
                    field: field.to_string(),
                    value: value.clone().unwrap_or_else(|| "null".into()),
                    reason: reason_of(e),
                }
            })?;
        }

        let area_code = values[0].clone().unwrap_or_default();
        self.lookup_area_code(&group.area_code, area_code, report)
    }

    /// Area code outside any phone group: format check, then the region lookup.
    fn check_area_code(
        &self,
        field: &str,
        answers: &ReconciledAnswers,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconcileError> {
        let Some(area_code) = answers.component(field) else {
            return Ok(());
        };
        validate_segment(PhoneSegment::AreaCode, Some(area_code.as_str())).map_err(|e| {
            ReconcileError::InvalidFormat {
                field: field.to_string(),
                value: area_code.clone(),
                reason: reason_of(e),
            }
        })?;
        self.lookup_area_code(field, area_code, report)
    }

    fn lookup_area_code(
        &self,
        field: &str,
        area_code: String,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconcileError> {
        if self.config.area_code_policy == AreaCodePolicy::Ignore {
            return Ok(());
        }

        let lookup = validate_area_code(
            self.plan.as_ref(),
            &self.config.country_calling_code,
            &area_code,
        );
        if !lookup.is_region() {
            if self.config.area_code_policy == AreaCodePolicy::Reject {
                return Err(ReconcileError::InvalidFormat {
                    field: field.to_string(),
                    value: area_code,
                    reason: format!("area code lookup returned '{lookup}'"),
                });
            }
            tracing::warn!(
                field = %field,
                area_code = %area_code,
                result = %lookup,
                "Area code did not resolve to a region"
            );
        }
        report.area_codes.push(AreaCodeCheck {
            field: field.to_string(),
            area_code,
            lookup,
        });
        Ok(())
    }

    fn check_date_triplet(
        &self,
        triplet: &DateTriplet,
        answers: &ReconciledAnswers,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconcileError> {
        let (Some(day), Some(month), Some(year)) = (
            answers.component(&triplet.day),
            answers.component(&triplet.month),
            answers.component(&triplet.year),
        ) else {
            tracing::debug!(prefix = %triplet.prefix, "Date triplet has a null component, skipped");
            report.dates.push(DateCheck {
                prefix: triplet.prefix.clone(),
                outcome: DateTripletOutcome::Skipped,
            });
            return Ok(());
        };

        let result = if triplet.require_past {
            validate_date_triplet(&day, &month, &year, self.config.age_window, self.today)
        } else {
            validate_calendar_triplet(&day, &month, &year)
        };
        let outcome = result.map_err(|reason| ReconcileError::InvalidDate {
            fields: triplet.fields().join("/"),
            value: format!("{day}/{month}/{year}"),
            reason,
        })?;

        report.dates.push(DateCheck {
            prefix: triplet.prefix.clone(),
            outcome,
        });
        Ok(())
    }

    fn check_addresses(
        &self,
        fields: &[String],
        answers: &ReconciledAnswers,
        report: &mut ReconciliationReport,
    ) -> Result<(), ReconcileError> {
        if !self.config.validate_addresses || fields.is_empty() {
            return Ok(());
        }
        let Some(gazetteer) = self.gazetteer.as_deref() else {
            tracing::warn!("Address validation enabled but no gazetteer loaded; skipped");
            return Ok(());
        };

        for field in fields {
            let Some(address) = answers.component(field) else {
                continue;
            };
            let result = validate_address(gazetteer, &address);
            if !result.outcome {
                tracing::warn!(field = %field, "Postal code could not be resolved");
            } else if !result.valid {
                return Err(ReconcileError::InvalidFormat {
                    field: field.clone(),
                    value: address,
                    reason: format!(
                        "postal code {} is in {}, not {}",
                        result.postal_code,
                        result.expected_region.as_deref().unwrap_or("?"),
                        result.provided_region
                    ),
                });
            }
            report.addresses.push(AddressCheck {
                field: field.clone(),
                result,
            });
        }
        Ok(())
    }
}

/// Record soft contract violations for one candidate.
fn audit_contract(field: &str, candidate: &Candidate, warnings: &mut Vec<ContractWarning>) {
    let confidence = candidate.confidence;
    let mut issues = Vec::new();
    if !(0.0..=1.0).contains(&confidence) {
        issues.push(ContractIssue::ConfidenceOutOfRange { confidence });
    }
    match &candidate.value {
        Some(_) if candidate.citations.is_empty() => issues.push(ContractIssue::MissingCitations),
        None if confidence > 0.0 => issues.push(ContractIssue::NullWithConfidence { confidence }),
        _ => {}
    }
    for issue in issues {
        tracing::warn!(field = %field, issue = ?issue, "Candidate contract issue");
        warnings.push(ContractWarning {
            field: field.to_string(),
            issue,
        });
    }
}

fn reason_of(err: ValidationError) -> String {
    match err {
        ValidationError::InvalidFormat(reason) => reason,
        other => other.to_string(),
    }
}
