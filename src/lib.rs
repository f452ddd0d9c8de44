pub mod config;
pub mod form; // Schema compiler, geometry index, AcroForm I/O
pub mod validation; // Phone, area code, date and address validators
pub mod reconcile; // Candidate selection + validation gate
pub mod encode; // Reconciled answers → native field ids
pub mod orchestrator; // End-to-end run
pub mod evaluation; // Ground-truth scoring

pub use config::FormFillConfig;
pub use encode::{encode_answers, NativeAnswers, NativeValue};
pub use evaluation::{evaluate, EvaluationReport, GroundTruth};
pub use form::{compile_schema, CompiledSchema, FormSchema, PdfForm};
pub use orchestrator::{FormFillPipeline, PipelineError, RunOutcome};
pub use reconcile::{
    CandidateSet, ExtractionOracle, ReconciledAnswers, ReconciliationEngine, SourceBundle,
};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// built-in filter. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
