//! AcroForm access through `lopdf`: reads a fillable PDF into a
//! [`FormDefinition`] and writes re-encoded answers back into it.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use super::schema::strip_marker;
use super::types::{
    Annotation, ChildWidget, FieldDefinition, FieldKind, FormDefinition, Page, Rect, OFF_STATE,
    SELECTION_MARKER,
};
use super::FormError;
use crate::encode::{NativeAnswers, NativeValue};

/// Field trees deeper than this are treated as malformed (reference cycles).
const MAX_FIELD_DEPTH: usize = 32;

fn pdf_err(e: lopdf::Error) -> FormError {
    FormError::Pdf(e.to_string())
}

/// Where a terminal field lives in the document.
#[derive(Debug, Clone)]
struct FieldHandle {
    field_id: ObjectId,
    kind: FieldKind,
    /// Widget annotations owned by the field; empty when field and widget are merged.
    widget_ids: Vec<ObjectId>,
}

/// A loaded fillable PDF.
pub struct PdfForm {
    doc: Document,
    definition: FormDefinition,
    handles: BTreeMap<String, FieldHandle>,
}

/// Outcome of writing answers into a form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulateSummary {
    pub written: usize,
    pub cleared: usize,
}

impl PdfForm {
    pub fn load(path: &Path) -> Result<Self, FormError> {
        let doc = Document::load(path).map_err(pdf_err)?;
        tracing::debug!(path = %path.display(), "Loaded PDF form");
        Self::from_document(doc)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormError> {
        let doc = Document::load_mem(bytes).map_err(pdf_err)?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: Document) -> Result<Self, FormError> {
        let mut fields = Vec::new();
        let mut handles = BTreeMap::new();

        for entry in acroform_fields(&doc)? {
            let Object::Reference(id) = entry else {
                tracing::warn!("Inline AcroForm field entry ignored (not addressable)");
                continue;
            };
            collect_fields(&doc, *id, None, &Inherited::default(), 0, &mut fields, &mut handles)?;
        }

        let pages = collect_pages(&doc);
        tracing::info!(
            fields = fields.len(),
            pages = pages.len(),
            "AcroForm definition read"
        );

        Ok(Self {
            doc,
            definition: FormDefinition { fields, pages },
            handles,
        })
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    /// Write re-encoded answers (keyed by native id) into the form fields.
    pub fn populate(&mut self, answers: &NativeAnswers) -> Result<PopulateSummary, FormError> {
        let mut summary = PopulateSummary::default();

        for (native_id, value) in answers.iter() {
            let handle = self
                .handles
                .get(native_id)
                .cloned()
                .ok_or_else(|| FormError::UnknownField(native_id.to_string()))?;

            match value {
                NativeValue::Text(text) => {
                    dict_mut(&mut self.doc, handle.field_id)?.set("V", encode_text(text));
                    summary.written += 1;
                }
                NativeValue::Empty => {
                    dict_mut(&mut self.doc, handle.field_id)?.remove(b"V");
                    summary.cleared += 1;
                }
                NativeValue::Selection(token) => {
                    if handle.kind != FieldKind::Button {
                        return Err(FormError::Pdf(format!(
                            "selection written to non-button field '{native_id}'"
                        )));
                    }
                    self.select(&handle, strip_marker(token))?;
                    summary.written += 1;
                }
            }
        }

        self.set_need_appearances()?;
        tracing::info!(
            written = summary.written,
            cleared = summary.cleared,
            "Form populated"
        );
        Ok(summary)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), FormError> {
        self.doc
            .save(path)
            .map_err(|e| FormError::Pdf(e.to_string()))?;
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, FormError> {
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| FormError::Pdf(e.to_string()))?;
        Ok(buf)
    }

    fn select(&mut self, handle: &FieldHandle, state: &str) -> Result<(), FormError> {
        let widgets = if handle.widget_ids.is_empty() {
            vec![handle.field_id]
        } else {
            handle.widget_ids.clone()
        };

        // Decide every widget's appearance before mutating anything.
        let mut plan = Vec::with_capacity(widgets.len());
        for id in widgets {
            let dict = self.doc.get_dictionary(id).map_err(pdf_err)?;
            let shows_state = appearance_states(&self.doc, dict)
                .iter()
                .any(|s| strip_marker(s) == state);
            plan.push((id, shows_state));
        }

        if !plan.iter().any(|(_, on)| *on) {
            return Err(FormError::Pdf(format!(
                "no widget of field {:?} has appearance state '{state}'",
                handle.field_id
            )));
        }

        dict_mut(&mut self.doc, handle.field_id)?
            .set("V", Object::Name(state.as_bytes().to_vec()));
        let off = strip_marker(OFF_STATE).as_bytes().to_vec();
        for (id, on) in plan {
            let name = if on { state.as_bytes().to_vec() } else { off.clone() };
            dict_mut(&mut self.doc, id)?.set("AS", Object::Name(name));
        }
        Ok(())
    }

    fn set_need_appearances(&mut self) -> Result<(), FormError> {
        let root_id = self
            .doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(pdf_err)?;
        let acroform_ref = match self.doc.get_dictionary(root_id).map_err(pdf_err)?.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => return Err(FormError::NoAcroForm),
        };
        match acroform_ref {
            Some(acroform_id) => {
                dict_mut(&mut self.doc, acroform_id)?.set("NeedAppearances", true);
            }
            None => {
                if let Ok(Object::Dictionary(acroform)) =
                    dict_mut(&mut self.doc, root_id)?.get_mut(b"AcroForm")
                {
                    acroform.set("NeedAppearances", true);
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Reading helpers
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct Inherited {
    kind: Option<FieldKind>,
    flags: u32,
    value: Option<String>,
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    match resolve(doc, obj)? {
        Object::Array(items) => Some(items),
        _ => None,
    }
}

fn dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary, FormError> {
    match doc.get_object_mut(id).map_err(pdf_err)? {
        Object::Dictionary(dict) => Ok(dict),
        _ => Err(FormError::Pdf(format!("object {id:?} is not a dictionary"))),
    }
}

fn acroform_fields(doc: &Document) -> Result<&Vec<Object>, FormError> {
    let catalog = doc.catalog().map_err(pdf_err)?;
    let acroform = catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .ok_or(FormError::NoAcroForm)?;
    acroform
        .get(b"Fields")
        .ok()
        .and_then(|o| resolve_array(doc, o))
        .ok_or(FormError::NoAcroForm)
}

/// Decode a PDF text string (UTF-16BE with BOM, else UTF-8, else Latin-1).
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
}

fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn text_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

fn name_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, dict.get(key).ok()?)? {
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Raw `/V`: names keep their selection marker, strings are decoded.
fn value_entry(doc: &Document, dict: &Dictionary) -> Option<String> {
    match resolve(doc, dict.get(b"V").ok()?)? {
        Object::Name(bytes) => Some(format!("{SELECTION_MARKER}{}", String::from_utf8_lossy(bytes))),
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

fn rect_entry(doc: &Document, dict: &Dictionary) -> Option<Rect> {
    let coords: Vec<f64> = resolve_array(doc, dict.get(b"Rect").ok()?)?
        .iter()
        .filter_map(|o| match resolve(doc, o)? {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        })
        .collect();
    Rect::from_slice(&coords)
}

/// Normal-appearance state keys of a widget, in native notation (`/Yes`).
fn appearance_states(doc: &Document, dict: &Dictionary) -> Vec<String> {
    let normal = dict
        .get(b"AP")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|o| resolve_dict(doc, o));
    match normal {
        Some(states) => states
            .iter()
            .map(|(key, _)| format!("{SELECTION_MARKER}{}", String::from_utf8_lossy(key)))
            .collect(),
        None => vec![],
    }
}

fn collect_fields(
    doc: &Document,
    id: ObjectId,
    parent_name: Option<&str>,
    inherited: &Inherited,
    depth: usize,
    fields: &mut Vec<FieldDefinition>,
    handles: &mut BTreeMap<String, FieldHandle>,
) -> Result<(), FormError> {
    if depth > MAX_FIELD_DEPTH {
        return Err(FormError::Pdf(format!("field tree deeper than {MAX_FIELD_DEPTH}")));
    }
    let dict = doc.get_dictionary(id).map_err(pdf_err)?;

    let name = match (parent_name, text_entry(doc, dict, b"T")) {
        (Some(parent), Some(partial)) => format!("{parent}.{partial}"),
        (None, Some(partial)) => partial,
        (Some(parent), None) => parent.to_string(),
        (None, None) => {
            tracing::debug!(object = ?id, "Unnamed top-level field ignored");
            return Ok(());
        }
    };

    let here = Inherited {
        kind: name_entry(doc, dict, b"FT")
            .map(|n| FieldKind::from_pdf_name(&n))
            .or_else(|| inherited.kind.clone()),
        flags: match dict.get(b"Ff").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Integer(flags)) => *flags as u32,
            _ => inherited.flags,
        },
        value: value_entry(doc, dict).or_else(|| inherited.value.clone()),
    };

    let mut field_kids = Vec::new();
    let mut widget_kids = Vec::new();
    if let Some(kids) = dict.get(b"Kids").ok().and_then(|o| resolve_array(doc, o)) {
        for kid in kids {
            let Object::Reference(kid_id) = kid else { continue };
            let Ok(kid_dict) = doc.get_dictionary(*kid_id) else { continue };
            if kid_dict.has(b"T") {
                field_kids.push(*kid_id);
            } else {
                widget_kids.push(*kid_id);
            }
        }
    }

    if !field_kids.is_empty() {
        for kid_id in field_kids {
            collect_fields(doc, kid_id, Some(&name), &here, depth + 1, fields, handles)?;
        }
        return Ok(());
    }

    let kind = here.kind.unwrap_or(FieldKind::Other);
    let children = widget_kids
        .iter()
        .filter_map(|kid_id| doc.get_dictionary(*kid_id).ok())
        .map(|kid| ChildWidget {
            appearance_states: appearance_states(doc, kid),
            rect: rect_entry(doc, kid),
        })
        .collect();

    fields.push(FieldDefinition {
        name: name.clone(),
        kind: kind.clone(),
        description: text_entry(doc, dict, b"TU"),
        value: here.value,
        flags: here.flags,
        children,
        appearance_states: appearance_states(doc, dict),
        rect: rect_entry(doc, dict),
    });
    handles.insert(
        name,
        FieldHandle {
            field_id: id,
            kind,
            widget_ids: widget_kids,
        },
    );
    Ok(())
}

/// Fully qualified name of the field owning a widget annotation.
fn owner_name(doc: &Document, dict: &Dictionary) -> Option<String> {
    let mut parts = Vec::new();
    let mut current = dict;
    for _ in 0..MAX_FIELD_DEPTH {
        if let Some(partial) = text_entry(doc, current, b"T") {
            parts.push(partial);
        }
        match current.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o)) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join("."))
}

fn collect_pages(doc: &Document) -> Vec<Page> {
    doc.get_pages()
        .values()
        .map(|page_id| {
            let annotations = doc
                .get_dictionary(*page_id)
                .ok()
                .and_then(|page| page.get(b"Annots").ok())
                .and_then(|o| resolve_array(doc, o))
                .map(|annots| {
                    annots
                        .iter()
                        .filter_map(|a| resolve_dict(doc, a))
                        .filter(|a| name_entry(doc, a, b"Subtype").as_deref() == Some("Widget"))
                        .map(|a| Annotation {
                            field_name: owner_name(doc, a),
                            rect: rect_entry(doc, a),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Page { annotations }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use lopdf::dictionary;

    use super::*;
    use crate::form::{compile_schema, FieldType};

    /// Build a one-page fillable PDF: a text field and a two-option checkbox group.
    pub(crate) fn make_form_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();
        let name_id = doc.new_object_id();
        let hand_id = doc.new_object_id();
        let right_id = doc.new_object_id();
        let left_id = doc.new_object_id();

        doc.objects.insert(
            name_id,
            Object::Dictionary(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal("First Name"),
                "TU" => Object::string_literal("Patient first name"),
                "Rect" => vec![50.into(), 700.into(), 250.into(), 720.into()],
                "P" => page_id,
            }),
        );
        doc.objects.insert(
            hand_id,
            Object::Dictionary(dictionary! {
                "FT" => "Btn",
                "T" => Object::string_literal("Hand"),
                "TU" => Object::string_literal("Dominant hand"),
                "Ff" => 0,
                "V" => "Off",
                "Kids" => vec![right_id.into(), left_id.into()],
            }),
        );
        for (id, state, x) in [(right_id, "Right", 50), (left_id, "Left", 100)] {
            doc.objects.insert(
                id,
                Object::Dictionary(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "Parent" => hand_id,
                    "Rect" => vec![x.into(), 600.into(), (x + 10).into(), 610.into()],
                    "AS" => "Off",
                    "AP" => dictionary! {
                        "N" => dictionary! {
                            state => Object::Null,
                            "Off" => Object::Null,
                        },
                    },
                    "P" => page_id,
                }),
            );
        }

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Annots" => vec![name_id.into(), right_id.into(), left_id.into()],
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => dictionary! {
                "Fields" => vec![name_id.into(), hand_id.into()],
            },
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn reads_fields_and_widgets() {
        let form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let def = form.definition();
        assert_eq!(def.fields.len(), 2);

        let name = &def.fields[0];
        assert_eq!(name.name, "First Name");
        assert_eq!(name.kind, FieldKind::Text);
        assert_eq!(name.description.as_deref(), Some("Patient first name"));
        assert_eq!(name.rect, Some(Rect::new(50.0, 700.0, 250.0, 720.0)));

        let hand = &def.fields[1];
        assert_eq!(hand.kind, FieldKind::Button);
        assert_eq!(hand.value.as_deref(), Some("/Off"));
        assert_eq!(hand.children.len(), 2);
        assert_eq!(hand.children[0].on_state(), Some("/Right"));
        assert_eq!(hand.children[1].on_state(), Some("/Left"));
    }

    #[test]
    fn page_annotations_resolve_owner_names() {
        let form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let annots = &form.definition().pages[0].annotations;
        let names: Vec<_> = annots.iter().filter_map(|a| a.field_name.as_deref()).collect();
        assert_eq!(names, vec!["First Name", "Hand", "Hand"]);
    }

    #[test]
    fn compiles_schema_from_pdf() {
        let form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let compiled = compile_schema(form.definition()).unwrap();
        let hand = compiled.schema.get("hand").unwrap();
        assert_eq!(hand.field_type, FieldType::CheckboxGroup);
        assert_eq!(hand.options, vec!["Right", "Left"]);
        assert_eq!(hand.anchors.len(), 2);
        assert_eq!(hand.ticked, Some(false));
        assert_eq!(compiled.schema.get("first name").unwrap().native_id, "First Name");
    }

    #[test]
    fn populates_text_and_checkbox() {
        let mut form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let mut answers = NativeAnswers::default();
        answers.insert("First Name", NativeValue::Text("Peter".into()));
        answers.insert("Hand", NativeValue::Selection("/Left".into()));

        let summary = form.populate(&answers).unwrap();
        assert_eq!(summary.written, 2);

        let reloaded = PdfForm::from_bytes(&form.to_bytes().unwrap()).unwrap();
        let def = reloaded.definition();
        assert_eq!(def.fields[0].value.as_deref(), Some("Peter"));
        assert_eq!(def.fields[1].value.as_deref(), Some("/Left"));
    }

    #[test]
    fn unknown_native_id_rejected() {
        let mut form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let mut answers = NativeAnswers::default();
        answers.insert("Nope", NativeValue::Text("x".into()));
        assert!(matches!(form.populate(&answers), Err(FormError::UnknownField(_))));
    }

    #[test]
    fn selection_without_matching_widget_rejected() {
        let mut form = PdfForm::from_bytes(&make_form_pdf()).unwrap();
        let mut answers = NativeAnswers::default();
        answers.insert("Hand", NativeValue::Selection("/Ambidextrous".into()));
        assert!(form.populate(&answers).is_err());
    }

    #[test]
    fn utf16_strings_round_trip() {
        let encoded = encode_text("Zoë");
        let Object::String(bytes, _) = encoded else { panic!("expected string") };
        assert_eq!(decode_text(&bytes), "Zoë");
        assert_eq!(decode_text(b"plain"), "plain");
    }

    #[test]
    fn rejects_pdf_without_acroform() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        assert!(matches!(PdfForm::from_bytes(&buf), Err(FormError::NoAcroForm)));
    }
}
