//! Form side of the engine: the form definition model, the field geometry
//! index, the schema compiler, and AcroForm I/O.

pub mod types;
pub mod geometry;
pub mod schema;
pub mod pdf;

pub use types::*;
pub use geometry::GeometryIndex;
pub use schema::{
    compile_schema, compile_with_index, normalize_name, strip_marker, CompiledSchema, FieldSchema,
    FieldType, FormSchema, SkipReason, SkippedField,
};
pub use pdf::{PdfForm, PopulateSummary};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Form has no AcroForm field dictionary")]
    NoAcroForm,

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Schema integrity: duplicate normalized field name '{0}'")]
    DuplicateField(String),

    #[error("Schema integrity: duplicate native field id '{0}'")]
    DuplicateNativeId(String),

    #[error("Schema integrity: field '{field}' has {options} options but {anchors} anchors")]
    AnchorMismatch {
        field: String,
        options: usize,
        anchors: usize,
    },

    #[error("Form has no field with native id '{0}'")]
    UnknownField(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormError {
    /// True for violations of the schema invariants (as opposed to I/O or parse failures).
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::DuplicateField(_) | Self::DuplicateNativeId(_) | Self::AnchorMismatch { .. }
        )
    }
}

/// Load a form definition document (JSON) from disk.
pub fn load_definition_json(path: &std::path::Path) -> Result<FormDefinition, FormError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| FormError::Json(e.to_string()))
}
