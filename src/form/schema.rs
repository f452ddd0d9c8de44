//! Form schema compiler.
//!
//! Walks a form's field definitions together with its geometry index and
//! produces one normalized, addressable [`FieldSchema`] per answerable field.
//! Fields outside the answer surface (radio groups, pushbuttons, choice lists,
//! signatures) are reported back as [`SkippedField`]s instead of vanishing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::geometry::GeometryIndex;
use super::types::{FieldDefinition, FieldKind, FormDefinition, Rect, OFF_STATE, SELECTION_MARKER};
use super::FormError;

/// Normalize a raw field identifier into its schema key (trimmed, lowercase).
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Strip the lead selection marker from a native state name (`/Yes` → `Yes`).
pub fn strip_marker(state: &str) -> &str {
    state.strip_prefix(SELECTION_MARKER).unwrap_or(state)
}

// ═══════════════════════════════════════════
// Schema records
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    CheckboxGroup,
    /// Never produced by the compiler; only reachable through a corrupted
    /// schema document, and rejected at re-encoding time.
    #[serde(other)]
    Unrecognized,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::CheckboxGroup => "checkbox_group",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One schema field, keyed by its normalized name in [`FormSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub anchors: Vec<Rect>,
    /// The form system's own identifier, verbatim; used for write-back.
    pub native_id: String,
    /// Current tick state of a checkbox group as found in the form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticked: Option<bool>,
}

impl FieldSchema {
    pub fn text(native_id: &str) -> Self {
        Self {
            label: None,
            field_type: FieldType::Text,
            options: vec![],
            anchors: vec![],
            native_id: native_id.into(),
            ticked: None,
        }
    }

    pub fn checkbox_group(native_id: &str, options: &[&str]) -> Self {
        Self {
            field_type: FieldType::CheckboxGroup,
            options: options.iter().map(|o| o.to_string()).collect(),
            ticked: Some(false),
            ..Self::text(native_id)
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_checkbox_group(&self) -> bool {
        self.field_type == FieldType::CheckboxGroup
    }
}

/// Normalized schema: normalized field name → record.
///
/// Serializes as a flat keyed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSchema {
    fields: BTreeMap<String, FieldSchema>,
}

impl FormSchema {
    /// Build a schema from pre-made records, enforcing the schema invariants.
    pub fn from_fields<I>(fields: I) -> Result<Self, FormError>
    where
        I: IntoIterator<Item = (String, FieldSchema)>,
    {
        let mut schema = Self::default();
        for (name, field) in fields {
            schema.insert(normalize_name(&name), field)?;
        }
        Ok(schema)
    }

    /// Load a schema document and re-check its invariants.
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        let raw: BTreeMap<String, FieldSchema> =
            serde_json::from_str(json).map_err(|e| FormError::Json(e.to_string()))?;
        Self::from_fields(raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, FormError> {
        serde_json::to_string_pretty(self).map_err(|e| FormError::Json(e.to_string()))
    }

    fn insert(&mut self, name: String, field: FieldSchema) -> Result<(), FormError> {
        if self.fields.contains_key(&name) {
            return Err(FormError::DuplicateField(name));
        }
        if self.fields.values().any(|f| f.native_id == field.native_id) {
            return Err(FormError::DuplicateNativeId(field.native_id));
        }
        if field.is_checkbox_group()
            && !field.options.is_empty()
            && !field.anchors.is_empty()
            && field.options.len() != field.anchors.len()
        {
            return Err(FormError::AnchorMismatch {
                field: name,
                options: field.options.len(),
                anchors: field.anchors.len(),
            });
        }
        self.fields.insert(name, field);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn native_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.values().map(|f| f.native_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ═══════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RadioGroup,
    Pushbutton,
    UnsupportedKind,
    EmptyName,
    /// Checkbox whose widgets expose no appearance states.
    NoSelectableWidget,
}

/// A form field left out of the answer surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedField {
    pub native_id: String,
    pub kind: FieldKind,
    pub reason: SkipReason,
}

/// Compiler output: the schema plus every field it did not cover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledSchema {
    pub schema: FormSchema,
    pub skipped: Vec<SkippedField>,
}

/// Compile a form definition into its normalized schema.
pub fn compile_schema(definition: &FormDefinition) -> Result<CompiledSchema, FormError> {
    let index = GeometryIndex::build(&definition.pages);
    compile_with_index(definition, &index)
}

/// Compile against an already-built geometry index.
pub fn compile_with_index(
    definition: &FormDefinition,
    index: &GeometryIndex,
) -> Result<CompiledSchema, FormError> {
    let mut compiled = CompiledSchema::default();

    for field in &definition.fields {
        let name = normalize_name(&field.name);
        let skip = |reason| SkippedField {
            native_id: field.name.clone(),
            kind: field.kind.clone(),
            reason,
        };

        if name.is_empty() {
            compiled.skipped.push(skip(SkipReason::EmptyName));
            continue;
        }

        let record = match field.kind {
            FieldKind::Text => text_record(field, &name, index),
            FieldKind::Button if field.is_radio() => {
                compiled.skipped.push(skip(SkipReason::RadioGroup));
                continue;
            }
            FieldKind::Button if field.is_pushbutton() => {
                compiled.skipped.push(skip(SkipReason::Pushbutton));
                continue;
            }
            FieldKind::Button => match checkbox_record(field, &name, index) {
                Some(record) => record,
                None => {
                    compiled.skipped.push(skip(SkipReason::NoSelectableWidget));
                    continue;
                }
            },
            _ => {
                compiled.skipped.push(skip(SkipReason::UnsupportedKind));
                continue;
            }
        };

        compiled.schema.insert(name, record)?;
    }

    for skipped in &compiled.skipped {
        tracing::warn!(
            field = %skipped.native_id,
            kind = %skipped.kind,
            reason = ?skipped.reason,
            "Form field left out of schema"
        );
    }
    tracing::info!(
        fields = compiled.schema.len(),
        skipped = compiled.skipped.len(),
        "Form schema compiled"
    );

    Ok(compiled)
}

fn text_record(field: &FieldDefinition, name: &str, index: &GeometryIndex) -> FieldSchema {
    FieldSchema {
        label: field.description.clone(),
        field_type: FieldType::Text,
        options: vec![],
        anchors: index.first(name).or(field.rect).into_iter().collect(),
        native_id: field.name.clone(),
        ticked: None,
    }
}

fn checkbox_record(
    field: &FieldDefinition,
    name: &str,
    index: &GeometryIndex,
) -> Option<FieldSchema> {
    let (options, anchors): (Vec<String>, Vec<Rect>) = if field.children.is_empty() {
        // Field and widget merged: a single implicit option anchored on the field itself.
        let on_state = field
            .appearance_states
            .iter()
            .find(|s| s.as_str() != OFF_STATE);
        let options = on_state.map(|s| strip_marker(s).to_string()).into_iter().collect();
        let anchors = field.rect.or_else(|| index.first(name)).into_iter().collect();
        (options, anchors)
    } else {
        let index_rects = index.rects(name);
        let own_complete = field.children.iter().all(|kid| kid.rect.is_some());
        let use_index = !own_complete && index_rects.len() == field.children.len();

        let mut options = Vec::with_capacity(field.children.len());
        let mut anchors = Vec::with_capacity(field.children.len());
        let mut geometry_complete = own_complete || use_index;
        for (i, kid) in field.children.iter().enumerate() {
            // A widget with no appearance states cannot be selected; its rect goes with it.
            let Some(state) = kid.on_state() else {
                tracing::debug!(field = %name, widget = i, "Widget without appearance states dropped");
                continue;
            };
            options.push(strip_marker(state).to_string());
            let rect = if use_index { index_rects.get(i).copied() } else { kid.rect };
            match rect {
                Some(rect) => anchors.push(rect),
                None => geometry_complete = false,
            }
        }
        if !geometry_complete {
            tracing::debug!(field = %name, "Incomplete widget geometry, anchors dropped");
            anchors.clear();
        }
        (options, anchors)
    };

    if !field.children.is_empty() && options.is_empty() {
        return None;
    }

    let ticked = field
        .value
        .as_deref()
        .is_some_and(|v| v != OFF_STATE);

    Some(FieldSchema {
        label: field.description.clone(),
        field_type: FieldType::CheckboxGroup,
        options,
        anchors,
        native_id: field.name.clone(),
        ticked: Some(ticked),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::form::types::{
        Annotation, ChildWidget, Page, PUSHBUTTON_FLAG, RADIO_FLAG,
    };

    fn rect(x: f64) -> Rect {
        Rect::new(x, 0.0, x + 10.0, 10.0)
    }

    fn kid(state: &str, x: f64) -> ChildWidget {
        ChildWidget {
            appearance_states: vec![state.into(), "/Off".into()],
            rect: Some(rect(x)),
        }
    }

    fn sample_definition() -> FormDefinition {
        let mut first = FieldDefinition::text("First Name");
        first.description = Some("Patient first name".into());

        let mut hand = FieldDefinition::button("Hand", 0);
        hand.description = Some("Dominant hand".into());
        hand.children = vec![kid("/Right", 0.0), kid("/Left", 20.0)];

        FormDefinition {
            fields: vec![
                first,
                hand,
                FieldDefinition::button("Sex", RADIO_FLAG),
                FieldDefinition::button("Print", PUSHBUTTON_FLAG),
                FieldDefinition {
                    kind: FieldKind::Choice,
                    ..FieldDefinition::text("Province")
                },
            ],
            pages: vec![Page {
                annotations: vec![Annotation {
                    field_name: Some("First Name".into()),
                    rect: Some(rect(100.0)),
                }],
            }],
        }
    }

    #[test]
    fn classifies_text_and_checkbox_fields() {
        let compiled = compile_schema(&sample_definition()).unwrap();
        let schema = &compiled.schema;
        assert_eq!(schema.len(), 2);

        let first = schema.get("first name").unwrap();
        assert_eq!(first.field_type, FieldType::Text);
        assert_eq!(first.native_id, "First Name");
        assert_eq!(first.label.as_deref(), Some("Patient first name"));
        assert_eq!(first.anchors, vec![rect(100.0)]);

        let hand = schema.get("hand").unwrap();
        assert_eq!(hand.field_type, FieldType::CheckboxGroup);
        assert_eq!(hand.options, vec!["Right", "Left"]);
        assert_eq!(hand.ticked, Some(false));
    }

    #[test]
    fn checkbox_options_and_anchors_preserve_widget_order() {
        let mut field = FieldDefinition::button("Delivery", 0);
        field.children = vec![kid("/Vaginal", 0.0), kid("/Caesarean", 20.0), kid("/Other", 40.0)];
        let compiled = compile_schema(&FormDefinition {
            fields: vec![field],
            pages: vec![],
        })
        .unwrap();
        let delivery = compiled.schema.get("delivery").unwrap();
        assert_eq!(delivery.options, vec!["Vaginal", "Caesarean", "Other"]);
        assert_eq!(delivery.anchors, vec![rect(0.0), rect(20.0), rect(40.0)]);
    }

    #[test]
    fn skipped_fields_are_reported() {
        let compiled = compile_schema(&sample_definition()).unwrap();
        let reasons: Vec<_> = compiled
            .skipped
            .iter()
            .map(|s| (s.native_id.as_str(), s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("Sex", SkipReason::RadioGroup),
                ("Print", SkipReason::Pushbutton),
                ("Province", SkipReason::UnsupportedKind),
            ]
        );
    }

    #[test]
    fn childless_checkbox_uses_own_rect_and_value() {
        let mut field = FieldDefinition::button("Consent", 0);
        field.rect = Some(rect(5.0));
        field.value = Some("/Yes".into());
        field.appearance_states = vec!["/Off".into(), "/Yes".into()];

        let compiled = compile_schema(&FormDefinition {
            fields: vec![field],
            pages: vec![],
        })
        .unwrap();
        let consent = compiled.schema.get("consent").unwrap();
        assert_eq!(consent.options, vec!["Yes"]);
        assert_eq!(consent.anchors, vec![rect(5.0)]);
        assert_eq!(consent.ticked, Some(true));
    }

    #[test]
    fn off_value_is_unticked() {
        let mut field = FieldDefinition::button("Consent", 0);
        field.value = Some("/Off".into());
        let compiled = compile_schema(&FormDefinition {
            fields: vec![field],
            pages: vec![],
        })
        .unwrap();
        assert_eq!(compiled.schema.get("consent").unwrap().ticked, Some(false));
    }

    #[test]
    fn widget_without_states_dropped_with_its_anchor() {
        let mut field = FieldDefinition::button("Hand", 0);
        field.children = vec![
            kid("/Right", 0.0),
            ChildWidget { appearance_states: vec![], rect: Some(rect(20.0)) },
            kid("/Left", 40.0),
        ];
        let compiled = compile_schema(&FormDefinition {
            fields: vec![field],
            pages: vec![],
        })
        .unwrap();
        let hand = compiled.schema.get("hand").unwrap();
        assert_eq!(hand.options, vec!["Right", "Left"]);
        assert_eq!(hand.anchors, vec![rect(0.0), rect(40.0)]);
        assert!(compiled.skipped.is_empty());
    }

    #[test]
    fn checkbox_without_any_states_is_skipped() {
        let mut field = FieldDefinition::button("Hand", 0);
        field.children = vec![
            ChildWidget { appearance_states: vec![], rect: Some(rect(0.0)) },
            ChildWidget { appearance_states: vec![], rect: Some(rect(20.0)) },
        ];
        let compiled = compile_schema(&FormDefinition {
            fields: vec![field],
            pages: vec![],
        })
        .unwrap();
        assert!(compiled.schema.is_empty());
        assert_eq!(compiled.skipped[0].reason, SkipReason::NoSelectableWidget);
    }

    #[test]
    fn missing_kid_geometry_falls_back_to_index() {
        let mut field = FieldDefinition::button("Hand", 0);
        field.children = vec![
            ChildWidget { appearance_states: vec!["/Right".into()], rect: None },
            ChildWidget { appearance_states: vec!["/Left".into()], rect: None },
        ];
        let pages = vec![Page {
            annotations: vec![
                Annotation { field_name: Some("Hand".into()), rect: Some(rect(1.0)) },
                Annotation { field_name: Some("Hand".into()), rect: Some(rect(2.0)) },
            ],
        }];
        let compiled = compile_schema(&FormDefinition { fields: vec![field], pages }).unwrap();
        assert_eq!(compiled.schema.get("hand").unwrap().anchors, vec![rect(1.0), rect(2.0)]);
    }

    #[test]
    fn duplicate_normalized_names_rejected() {
        let definition = FormDefinition {
            fields: vec![FieldDefinition::text("Phone"), FieldDefinition::text(" phone")],
            pages: vec![],
        };
        let err = compile_schema(&definition).unwrap_err();
        assert!(matches!(err, FormError::DuplicateField(ref n) if n == "phone"));
    }

    #[test]
    fn native_ids_unique_and_names_normalized() {
        let compiled = compile_schema(&sample_definition()).unwrap();
        let ids: HashSet<&str> = compiled.schema.native_ids().collect();
        assert_eq!(ids.len(), compiled.schema.len());
        assert!(compiled.schema.names().all(|n| n == n.trim().to_lowercase()));
    }

    #[test]
    fn from_fields_rejects_duplicate_native_ids() {
        let err = FormSchema::from_fields(vec![
            ("a".to_string(), FieldSchema::text("X")),
            ("b".to_string(), FieldSchema::text("X")),
        ])
        .unwrap_err();
        assert!(matches!(err, FormError::DuplicateNativeId(_)));
    }

    #[test]
    fn from_fields_rejects_anchor_mismatch() {
        let mut field = FieldSchema::checkbox_group("Hand", &["Right", "Left"]);
        field.anchors = vec![rect(0.0)];
        let err = FormSchema::from_fields(vec![("hand".to_string(), field)]).unwrap_err();
        assert!(matches!(err, FormError::AnchorMismatch { options: 2, anchors: 1, .. }));
    }

    #[test]
    fn schema_document_round_trips() {
        let compiled = compile_schema(&sample_definition()).unwrap();
        let json = compiled.schema.to_json_pretty().unwrap();
        assert!(json.contains("\"checkbox_group\""));
        let reloaded = FormSchema::from_json(&json).unwrap();
        assert_eq!(reloaded, compiled.schema);
    }

    #[test]
    fn unknown_type_in_document_loads_as_unrecognized() {
        let schema = FormSchema::from_json(
            r#"{"x": {"label": null, "type": "dropdown", "native_id": "X"}}"#,
        )
        .unwrap();
        assert_eq!(schema.get("x").unwrap().field_type, FieldType::Unrecognized);
    }
}
