//! Multi-source reconciliation: oracle candidates in, validated answers out.

pub mod error;
pub mod types;
pub mod priority;
pub mod classes;
pub mod oracle;
pub mod report;
pub mod engine;

pub use error::ReconcileError;
pub use types::{Candidate, CandidateSet, CandidateValue, Citation, ReconciledAnswers, SourceTag};
pub use priority::SourcePriorityTable;
pub use classes::{DateTriplet, FieldClasses, PhoneGroup};
pub use oracle::{ExtractionOracle, RecordedOracle, SourceBundle};
pub use report::{
    AddressCheck, AreaCodeCheck, ContractIssue, ContractWarning, DateCheck, ReconciliationReport,
    SelectionRule, SourceSelection,
};
pub use engine::{Reconciliation, ReconciliationEngine};
