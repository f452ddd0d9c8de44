//! Answer re-encoding: reconciled answers (normalized names) → native field
//! ids, with checkbox selections written as the form's selection token.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::form::{FieldType, FormSchema, SELECTION_MARKER};
use crate::reconcile::{CandidateValue, ReconciledAnswers};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Schema integrity: field '{field}' has an unrecognized type")]
    InvalidFieldType { field: String },

    #[error("Field '{field}': '{value}' is not one of the options [{options}]")]
    UnknownOption {
        field: String,
        value: String,
        options: String,
    },

    #[error("Field '{field}': {count} selections for a single-choice group")]
    MultipleSelections { field: String, count: usize },

    #[error("Schema integrity: no answer for field '{0}'")]
    MissingAnswer(String),
}

/// Value ready to be written into a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    Text(String),
    /// Text field answered null; the field is cleared.
    Empty,
    /// Marker-prefixed option token, e.g. `/Left`.
    Selection(String),
}

impl Serialize for NativeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) | Self::Selection(text) => serializer.serialize_str(text),
            Self::Empty => serializer.serialize_none(),
        }
    }
}

/// Output map keyed by native field id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NativeAnswers {
    values: BTreeMap<String, NativeValue>,
}

impl NativeAnswers {
    pub fn insert(&mut self, native_id: &str, value: NativeValue) {
        self.values.insert(native_id.to_string(), value);
    }

    pub fn get(&self, native_id: &str) -> Option<&NativeValue> {
        self.values.get(native_id)
    }

    pub fn contains(&self, native_id: &str) -> bool {
        self.values.contains_key(native_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn native_ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Selection token for an option name.
pub fn selection_token(option: &str) -> String {
    format!("{SELECTION_MARKER}{option}")
}

/// Map reconciled answers onto native field ids. Read-only over both inputs.
pub fn encode_answers(
    schema: &FormSchema,
    answers: &ReconciledAnswers,
) -> Result<NativeAnswers, EncodeError> {
    let mut native = NativeAnswers::default();
    let mut omitted = 0usize;

    for (name, field) in schema.iter() {
        let value = answers
            .get(name)
            .ok_or_else(|| EncodeError::MissingAnswer(name.clone()))?;

        match field.field_type {
            FieldType::Text => {
                let encoded = match value {
                    Some(v) => NativeValue::Text(v.to_text()),
                    None => NativeValue::Empty,
                };
                native.insert(&field.native_id, encoded);
            }
            FieldType::CheckboxGroup => {
                let Some(option) = selected_option(name, value)? else {
                    omitted += 1;
                    continue;
                };
                if !field.options.iter().any(|o| *o == option) {
                    return Err(EncodeError::UnknownOption {
                        field: name.clone(),
                        value: option,
                        options: field.options.join(", "),
                    });
                }
                native.insert(&field.native_id, NativeValue::Selection(selection_token(&option)));
            }
            FieldType::Unrecognized => {
                return Err(EncodeError::InvalidFieldType {
                    field: name.clone(),
                });
            }
        }
    }

    tracing::debug!(
        encoded = native.len(),
        omitted_checkboxes = omitted,
        "Answers re-encoded"
    );
    Ok(native)
}

/// The single option a checkbox answer names, `None` when unselected.
fn selected_option(
    field: &str,
    value: Option<&CandidateValue>,
) -> Result<Option<String>, EncodeError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_null_like() => Ok(None),
        Some(CandidateValue::List(items)) => match items.as_slice() {
            [only] => Ok(Some(only.clone())),
            many => Err(EncodeError::MultipleSelections {
                field: field.to_string(),
                count: many.len(),
            }),
        },
        Some(other) => Ok(Some(other.to_text())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldSchema;

    fn make_schema() -> FormSchema {
        FormSchema::from_fields([
            ("first name".to_string(), FieldSchema::text("First Name")),
            (
                "hand".to_string(),
                FieldSchema::checkbox_group("Hand", &["Right", "Left"]),
            ),
        ])
        .unwrap()
    }

    fn make_answers(first: Option<&str>, hand: Option<CandidateValue>) -> ReconciledAnswers {
        let mut answers = ReconciledAnswers::default();
        answers.insert("first name", first.map(CandidateValue::text));
        answers.insert("hand", hand);
        answers
    }

    #[test]
    fn text_and_selection_encoded_by_native_id() {
        let native = encode_answers(
            &make_schema(),
            &make_answers(Some("Peter"), Some(CandidateValue::text("Left"))),
        )
        .unwrap();
        assert_eq!(native.get("First Name"), Some(&NativeValue::Text("Peter".into())));
        assert_eq!(native.get("Hand"), Some(&NativeValue::Selection("/Left".into())));
        let ids: Vec<&str> = native.native_ids().collect();
        assert_eq!(ids, vec!["First Name", "Hand"]);
    }

    #[test]
    fn null_checkbox_omitted_null_text_kept_empty() {
        let native = encode_answers(&make_schema(), &make_answers(None, None)).unwrap();
        assert!(!native.contains("Hand"));
        assert_eq!(native.get("First Name"), Some(&NativeValue::Empty));
    }

    #[test]
    fn options_match_exactly() {
        let err = encode_answers(
            &make_schema(),
            &make_answers(Some("Peter"), Some(CandidateValue::text("left"))),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::UnknownOption { ref value, .. } if value == "left"));
    }

    #[test]
    fn list_answers_for_checkboxes() {
        let single = make_answers(None, Some(CandidateValue::List(vec!["Right".into()])));
        let native = encode_answers(&make_schema(), &single).unwrap();
        assert_eq!(native.get("Hand"), Some(&NativeValue::Selection("/Right".into())));

        let empty = make_answers(None, Some(CandidateValue::List(vec![])));
        assert!(!encode_answers(&make_schema(), &empty).unwrap().contains("Hand"));

        let many = make_answers(
            None,
            Some(CandidateValue::List(vec!["Right".into(), "Left".into()])),
        );
        assert_eq!(
            encode_answers(&make_schema(), &many).unwrap_err(),
            EncodeError::MultipleSelections {
                field: "hand".into(),
                count: 2
            }
        );
    }

    #[test]
    fn list_text_answers_joined() {
        let mut answers = make_answers(None, None);
        answers.insert(
            "first name",
            Some(CandidateValue::List(vec!["Peter".into(), "Julius".into()])),
        );
        let native = encode_answers(&make_schema(), &answers).unwrap();
        assert_eq!(native.get("First Name"), Some(&NativeValue::Text("Peter, Julius".into())));
    }

    #[test]
    fn unrecognized_type_fails_fast() {
        let schema = FormSchema::from_json(
            r#"{"sig": {"label": null, "type": "signature", "options": [], "anchors": [], "native_id": "Sig"}}"#,
        )
        .unwrap();
        let mut answers = ReconciledAnswers::default();
        answers.insert("sig", None);
        assert_eq!(
            encode_answers(&schema, &answers).unwrap_err(),
            EncodeError::InvalidFieldType { field: "sig".into() }
        );
    }

    #[test]
    fn missing_answer_is_integrity_error() {
        let answers = ReconciledAnswers::default();
        assert!(matches!(
            encode_answers(&make_schema(), &answers),
            Err(EncodeError::MissingAnswer(_))
        ));
    }

    #[test]
    fn serializes_nulls_for_cleared_fields() {
        let native = encode_answers(&make_schema(), &make_answers(None, Some(CandidateValue::text("Right"))))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&native.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"First Name": null, "Hand": "/Right"}));
    }
}
