//! End-to-end form fill run.
//!
//! Flow: schema → oracle proposal → reconciliation → re-encoding, with an
//! optional final step that writes the native answers back into a PDF.
//! Each run gets a fresh id so its log lines can be grouped.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, FormFillConfig};
use crate::encode::{encode_answers, EncodeError, NativeAnswers};
use crate::form::{compile_schema, CompiledSchema, FormError, FormSchema, PdfForm, SkippedField};
use crate::reconcile::{
    ExtractionOracle, ReconcileError, ReconciledAnswers, ReconciliationEngine,
    ReconciliationReport, SourceBundle,
};
use crate::validation::{InMemoryGazetteer, ValidationError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Form error: {0}")]
    Form(#[from] FormError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Everything a single run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Name of the oracle that proposed the candidates.
    pub oracle: String,
    pub answers: ReconciledAnswers,
    pub report: ReconciliationReport,
    pub native: NativeAnswers,
    /// Form fields outside the answer surface (empty for schema-only runs).
    pub skipped: Vec<SkippedField>,
}

pub struct FormFillPipeline {
    engine: ReconciliationEngine,
    oracle: Box<dyn ExtractionOracle>,
}

impl FormFillPipeline {
    pub fn new(engine: ReconciliationEngine, oracle: Box<dyn ExtractionOracle>) -> Self {
        Self { engine, oracle }
    }

    /// Build from a JSON config file. When address validation is on, the
    /// gazetteer is loaded from `gazetteer_dir` (see `config::gazetteer_dir`).
    pub fn from_config_file(
        config_path: &Path,
        gazetteer_dir: &Path,
        oracle: Box<dyn ExtractionOracle>,
    ) -> Result<Self, PipelineError> {
        let config = FormFillConfig::from_json_file(config_path)?;
        let validate_addresses = config.validate_addresses;
        let mut engine = ReconciliationEngine::new(config);
        if validate_addresses {
            let gazetteer = InMemoryGazetteer::load_dir(gazetteer_dir)?;
            tracing::info!(entries = gazetteer.len(), "Address validation enabled");
            engine = engine.with_gazetteer(Arc::new(gazetteer));
        }
        Ok(Self::new(engine, oracle))
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Propose, reconcile and re-encode answers for `schema`.
    pub fn run(
        &self,
        schema: &FormSchema,
        sources: &SourceBundle,
    ) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let _span = tracing::info_span!("formfill_run", run_id = %run_id).entered();

        tracing::info!(
            oracle = %self.oracle.name(),
            fields = schema.len(),
            "Starting form fill run"
        );

        let candidates = self.oracle.propose(schema, sources)?;
        let reconciliation = self.engine.reconcile(schema, &candidates)?;
        let native = encode_answers(schema, &reconciliation.answers)?;

        tracing::info!(
            answered = reconciliation.report.answered,
            encoded = native.len(),
            warnings = reconciliation.report.warnings.len(),
            "Form fill run complete"
        );

        Ok(RunOutcome {
            run_id,
            started_at,
            oracle: self.oracle.name().to_string(),
            answers: reconciliation.answers,
            report: reconciliation.report,
            native,
            skipped: Vec::new(),
        })
    }

    /// Same as [`run`](Self::run), carrying the compiler's skipped fields along.
    pub fn run_compiled(
        &self,
        compiled: &CompiledSchema,
        sources: &SourceBundle,
    ) -> Result<RunOutcome, PipelineError> {
        let mut outcome = self.run(&compiled.schema, sources)?;
        outcome.skipped = compiled.skipped.clone();
        Ok(outcome)
    }

    /// Compile the form's schema, run, and write the answers into the form.
    pub fn fill_pdf(
        &self,
        form: &mut PdfForm,
        sources: &SourceBundle,
    ) -> Result<RunOutcome, PipelineError> {
        let compiled = compile_schema(form.definition())?;
        for skipped in &compiled.skipped {
            tracing::warn!(
                native_id = %skipped.native_id,
                reason = ?skipped.reason,
                "Form field not covered by schema"
            );
        }

        let outcome = self.run_compiled(&compiled, sources)?;
        let summary = form.populate(&outcome.native)?;
        tracing::debug!(
            run_id = %outcome.run_id,
            written = summary.written,
            cleared = summary.cleared,
            "Answers written to form"
        );
        Ok(outcome)
    }

    pub fn fill_pdf_file(
        &self,
        input: &Path,
        output: &Path,
        sources: &SourceBundle,
    ) -> Result<RunOutcome, PipelineError> {
        let mut form = PdfForm::load(input)?;
        let outcome = self.fill_pdf(&mut form, sources)?;
        form.save(output)?;
        tracing::info!(output = %output.display(), "Filled form saved");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::encode::NativeValue;
    use crate::form::pdf::tests::make_form_pdf;
    use crate::form::FieldSchema;
    use crate::reconcile::{Candidate, CandidateSet, RecordedOracle, SourceTag};

    fn make_engine() -> ReconciliationEngine {
        ReconciliationEngine::new(FormFillConfig::default())
            .with_today(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap())
    }

    fn make_pipeline(candidates: CandidateSet) -> FormFillPipeline {
        FormFillPipeline::new(make_engine(), Box::new(RecordedOracle::new(candidates)))
    }

    fn make_sources() -> SourceBundle {
        SourceBundle::new(
            "Employer statement",
            "Phone 613-656-5890",
            json!({"first_name": "Peter"}),
        )
    }

    fn phone_schema() -> FormSchema {
        FormSchema::from_fields([
            ("areacode".to_string(), FieldSchema::text("AreaCode")),
            ("phonea".to_string(), FieldSchema::text("PhoneA")),
            ("phoneb".to_string(), FieldSchema::text("PhoneB")),
            (
                "hand".to_string(),
                FieldSchema::checkbox_group("Hand", &["Right", "Left"]),
            ),
        ])
        .unwrap()
    }

    fn phone_candidates(area: &str) -> CandidateSet {
        CandidateSet::from_candidates([
            Candidate::text("areacode", area).cited(SourceTag::S3, area),
            Candidate::text("phonea", "656").cited(SourceTag::S3, "656"),
            Candidate::text("phoneb", "5890").cited(SourceTag::S3, "5890"),
            Candidate::null("hand"),
        ])
    }

    #[test]
    fn valid_phone_reaches_native_map() {
        let outcome = make_pipeline(phone_candidates("613"))
            .run(&phone_schema(), &make_sources())
            .unwrap();

        assert_eq!(outcome.oracle, "recorded");
        assert_eq!(outcome.native.get("AreaCode"), Some(&NativeValue::Text("613".into())));
        assert_eq!(outcome.native.get("PhoneA"), Some(&NativeValue::Text("656".into())));
        assert_eq!(outcome.native.get("PhoneB"), Some(&NativeValue::Text("5890".into())));
        assert!(!outcome.native.contains("Hand"));
        assert_eq!(outcome.report.answered, 3);
    }

    #[test]
    fn native_ids_cover_schema_except_unselected_checkboxes() {
        let schema = phone_schema();
        let mut candidates = phone_candidates("613");
        candidates.push(Candidate::text("hand", "Left").cited(SourceTag::S1, "left-handed"));

        let outcome = make_pipeline(candidates).run(&schema, &make_sources()).unwrap();

        let mut expected: Vec<&str> = schema.native_ids().collect();
        expected.sort_unstable();
        let got: Vec<&str> = outcome.native.native_ids().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn invalid_area_code_aborts_run() {
        let err = make_pipeline(phone_candidates("555"))
            .run(&phone_schema(), &make_sources())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Reconcile(ref e) if e.is_format()));
    }

    #[test]
    fn invented_field_aborts_run() {
        let mut candidates = phone_candidates("613");
        candidates.push(Candidate::text("nickname", "Pete").cited(SourceTag::S3, "Pete"));
        let err = make_pipeline(candidates)
            .run(&phone_schema(), &make_sources())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Reconcile(ReconcileError::SchemaIntegrity(_))
        ));
    }

    #[test]
    fn outcome_serializes_with_run_metadata() {
        let outcome = make_pipeline(phone_candidates("613"))
            .run(&phone_schema(), &make_sources())
            .unwrap();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["native"]["AreaCode"], json!("613"));
        assert_eq!(value["run_id"], json!(outcome.run_id.to_string()));
        assert!(value["skipped"].as_array().unwrap().is_empty());
    }

    fn pdf_candidates() -> CandidateSet {
        CandidateSet::from_candidates([
            Candidate::text("first name", "Peter").cited(SourceTag::S3, "Peter"),
            Candidate::text("hand", "Left").cited(SourceTag::S1, "left hand"),
        ])
    }

    #[test]
    fn fills_pdf_in_memory() {
        let mut form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let outcome = make_pipeline(pdf_candidates())
            .fill_pdf(&mut form, &make_sources())
            .unwrap();
        assert_eq!(outcome.native.len(), 2);

        let reloaded = PdfForm::from_bytes(&form.to_bytes().unwrap()).unwrap();
        let def = reloaded.definition();
        assert_eq!(def.fields[0].value.as_deref(), Some("Peter"));
        assert_eq!(def.fields[1].value.as_deref(), Some("/Left"));
    }

    #[test]
    fn fills_pdf_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blank.pdf");
        let output = dir.path().join("filled.pdf");
        std::fs::write(&input, make_form_pdf()).unwrap();

        make_pipeline(pdf_candidates())
            .fill_pdf_file(&input, &output, &make_sources())
            .unwrap();

        let filled = PdfForm::load(&output).unwrap();
        assert_eq!(filled.definition().fields[0].value.as_deref(), Some("Peter"));
    }

    #[test]
    fn missing_pdf_is_form_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = make_pipeline(pdf_candidates())
            .fill_pdf_file(
                &dir.path().join("absent.pdf"),
                &dir.path().join("out.pdf"),
                &make_sources(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Form(_)));
    }

    #[test]
    fn pipeline_built_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("formfill.json");
        std::fs::write(&config_path, r#"{"validate_addresses": true}"#).unwrap();
        std::fs::write(
            dir.path().join("CA.txt"),
            "CA\tK7L\tKingston\tOntario\tON\n",
        )
        .unwrap();

        let pipeline = FormFillPipeline::from_config_file(
            &config_path,
            dir.path(),
            Box::new(RecordedOracle::new(phone_candidates("613"))),
        )
        .unwrap();
        assert!(pipeline.engine().config().validate_addresses);
    }

    #[test]
    fn invalid_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("formfill.json");
        std::fs::write(&config_path, r#"{"country_calling_code": "+1"}"#).unwrap();
        let err = FormFillPipeline::from_config_file(
            &config_path,
            dir.path(),
            Box::new(RecordedOracle::new(CandidateSet::new())),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn malformed_gazetteer_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("formfill.json");
        std::fs::write(&config_path, r#"{"validate_addresses": true}"#).unwrap();
        std::fs::write(dir.path().join("US.txt"), "US\t10001\n").unwrap();
        let err = FormFillPipeline::from_config_file(
            &config_path,
            dir.path(),
            Box::new(RecordedOracle::new(CandidateSet::new())),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::Validation(ValidationError::Gazetteer(_))));
    }
}
