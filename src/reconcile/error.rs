//! Reconciliation error types.

use thiserror::Error;

use crate::validation::DateError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Schema integrity: {0}")]
    SchemaIntegrity(String),

    #[error("Invalid format for field '{field}' (value '{value}'): {reason}")]
    InvalidFormat {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid date in fields '{fields}' (value '{value}'): {reason}")]
    InvalidDate {
        fields: String,
        value: String,
        #[source]
        reason: DateError,
    },

    #[error("Oracle output violates contract: {0}")]
    OracleContract(String),

    #[error("Oracle failed: {0}")]
    Oracle(String),

    #[error("Source priority table error: {0}")]
    PriorityTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconcileError {
    /// Field-level format failures, as opposed to structural or oracle failures.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::InvalidFormat { .. } | Self::InvalidDate { .. })
    }
}
