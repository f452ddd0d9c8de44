//! Form definition model: what a fillable form exposes about its fields,
//! independent of the file format it was read from.

use serde::{Deserialize, Serialize};

/// Field flag bit marking a button field as a radio group.
pub const RADIO_FLAG: u32 = 1 << 15;

/// Field flag bit marking a button field as a pushbutton.
pub const PUSHBUTTON_FLAG: u32 = 1 << 16;

/// Raw value of an unticked checkbox.
pub const OFF_STATE: &str = "/Off";

/// Lead marker character of a selected-option token (`/Yes`, `/Right`).
pub const SELECTION_MARKER: char = '/';

// ═══════════════════════════════════════════
// Geometry
// ═══════════════════════════════════════════

/// Axis-aligned anchor rectangle in page space (x0, y0, x1, y1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build from a 4-element coordinate array, as stored in a form's `/Rect`.
    pub fn from_slice(coords: &[f64]) -> Option<Self> {
        match coords {
            [x0, y0, x1, y1] => Some(Self::new(*x0, *y0, *x1, *y1)),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════
// Field kinds
// ═══════════════════════════════════════════

/// Field-kind discriminator (`/FT` in AcroForm terms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
    #[serde(other)]
    Other,
}

impl FieldKind {
    pub fn from_pdf_name(name: &str) -> Self {
        match name.trim_start_matches(SELECTION_MARKER) {
            "Tx" => Self::Text,
            "Btn" => Self::Button,
            "Ch" => Self::Choice,
            "Sig" => Self::Signature,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Button => "button",
            Self::Choice => "choice",
            Self::Signature => "signature",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Field definitions
// ═══════════════════════════════════════════

/// A widget belonging to a field (one per checkbox option).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildWidget {
    /// Normal-appearance state keys in native notation, e.g. `["/Right", "/Off"]`.
    #[serde(default)]
    pub appearance_states: Vec<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
}

impl ChildWidget {
    /// The state this widget shows when selected.
    ///
    /// Prefers the first non-off key; a widget exposing only the off state yields it.
    pub fn on_state(&self) -> Option<&str> {
        self.appearance_states
            .iter()
            .find(|s| s.as_str() != OFF_STATE)
            .or_else(|| self.appearance_states.first())
            .map(String::as_str)
    }
}

/// One field of a form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Stable raw identifier, verbatim (`/T`, fully qualified).
    pub name: String,
    pub kind: FieldKind,
    /// Human-readable description (`/TU`).
    #[serde(default)]
    pub description: Option<String>,
    /// Current raw value (`/V`); checkbox values keep their marker (`/Yes`, `/Off`).
    #[serde(default)]
    pub value: Option<String>,
    /// Flag bitmask (`/Ff`).
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub children: Vec<ChildWidget>,
    /// Appearance states of the field itself when field and widget are merged.
    #[serde(default)]
    pub appearance_states: Vec<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
}

impl FieldDefinition {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            description: None,
            value: None,
            flags: 0,
            children: vec![],
            appearance_states: vec![],
            rect: None,
        }
    }

    pub fn button(name: &str, flags: u32) -> Self {
        Self {
            kind: FieldKind::Button,
            flags,
            ..Self::text(name)
        }
    }

    pub fn is_radio(&self) -> bool {
        self.flags & RADIO_FLAG != 0
    }

    pub fn is_pushbutton(&self) -> bool {
        self.flags & PUSHBUTTON_FLAG != 0
    }
}

/// A widget annotation placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Owning field's raw identifier, when the annotation is a field widget.
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A complete fillable form description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub pages: Vec<Page>,
}
