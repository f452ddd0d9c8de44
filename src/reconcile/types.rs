//! Oracle-side data: candidate values, their provenance, and the parsed
//! candidate set for one extraction run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ReconcileError;
use crate::form::normalize_name;
use crate::validation::is_null_sentinel;

// ═══════════════════════════════════════════
// Sources
// ═══════════════════════════════════════════

/// Evidence source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum SourceTag {
    /// Scanned or parsed document text.
    S1,
    /// Free-text clinical notes.
    S2,
    /// Structured demographic record.
    S3,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S1 => "S1",
            Self::S2 => "S2",
            Self::S3 => "S3",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::S1 => "Document text",
            Self::S2 => "Clinical notes",
            Self::S3 => "Demographic record",
        }
    }

    pub fn all() -> [SourceTag; 3] {
        [Self::S1, Self::S2, Self::S3]
    }

    /// Lenient parse: `"S3"`, `"s3"`, `"[S3]"`, `"S3 (Patient JSON)"`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_start_matches('[');
        let mut chars = trimmed.chars();
        if !matches!(chars.next(), Some('S' | 's')) {
            return None;
        }
        let tag = match chars.next() {
            Some('1') => Self::S1,
            Some('2') => Self::S2,
            Some('3') => Self::S3,
            _ => return None,
        };
        match chars.next() {
            None => Some(tag),
            Some(c) if !c.is_ascii_alphanumeric() => Some(tag),
            Some(_) => None,
        }
    }
}

impl TryFrom<String> for SourceTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_lenient(&value).ok_or_else(|| format!("unknown source tag '{value}'"))
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════
// Values
// ═══════════════════════════════════════════

/// Non-null candidate value. Null is modelled as `Option::None` around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateValue {
    Text(String),
    Number(serde_json::Number),
    List(Vec<String>),
}

impl CandidateValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Scalar rendering; `None` for lists.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::List(_) => None,
        }
    }

    /// Flat text rendering; lists are joined with ", ".
    pub fn to_text(&self) -> String {
        match self {
            Self::List(items) => items.join(", "),
            other => other.as_scalar().unwrap_or_default(),
        }
    }

    /// Blank text, text equal to the null sentinel, or an empty list.
    pub fn is_null_like(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty() || is_null_sentinel(s),
            Self::Number(_) => false,
            Self::List(items) => items.is_empty(),
        }
    }
}

impl std::fmt::Display for CandidateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: SourceTag,
    #[serde(default)]
    pub quote: String,
}

/// One proposed value for one field, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub field_name: String,
    pub value: Option<CandidateValue>,
    pub source: Option<SourceTag>,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub field_spec: Option<String>,
}

impl Candidate {
    pub fn new(field_name: &str, value: Option<CandidateValue>) -> Self {
        Self {
            field_name: normalize_name(field_name),
            value,
            source: None,
            citations: Vec::new(),
            confidence: 0.0,
            reasoning: None,
            field_spec: None,
        }
    }

    pub fn text(field_name: &str, value: &str) -> Self {
        Self::new(field_name, Some(CandidateValue::text(value)))
    }

    pub fn null(field_name: &str) -> Self {
        Self::new(field_name, None)
    }

    pub fn cited(mut self, source: SourceTag, quote: &str) -> Self {
        self.citations.push(Citation {
            source,
            quote: quote.to_string(),
        });
        self
    }

    pub fn with_source(mut self, source: SourceTag) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Declared source, else the first cited one.
    pub fn primary_source(&self) -> Option<SourceTag> {
        self.source
            .or_else(|| self.citations.first().map(|c| c.source))
    }

    /// Every source this candidate draws on, in citation order, deduplicated.
    pub fn cited_sources(&self) -> Vec<SourceTag> {
        let mut sources: Vec<SourceTag> = Vec::new();
        for tag in self.source.into_iter().chain(self.citations.iter().map(|c| c.source)) {
            if !sources.contains(&tag) {
                sources.push(tag);
            }
        }
        sources
    }
}

// ═══════════════════════════════════════════
// Oracle contract
// ═══════════════════════════════════════════

/// Wire shape of one oracle entry.
#[derive(Debug, Deserialize)]
struct OracleEntry {
    #[serde(default)]
    value: Option<CandidateValue>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    field_spec: Option<String>,
}

impl OracleEntry {
    fn into_candidate(self, field_name: &str) -> Candidate {
        let source = self.source.as_deref().and_then(|raw| {
            let parsed = SourceTag::parse_lenient(raw);
            if parsed.is_none() && !is_null_sentinel(raw) && !raw.trim().is_empty() {
                tracing::warn!(field = %field_name, source = %raw, "Unrecognized source tag ignored");
            }
            parsed
        });
        Candidate {
            field_name: field_name.to_string(),
            value: self.value,
            source,
            citations: self.citations,
            confidence: self.confidence.unwrap_or(0.0),
            reasoning: self.reasoning,
            field_spec: self.field_spec,
        }
    }
}

/// Entry as written by the oracle: one resolved proposal or several per-source ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OracleField {
    PerSource(Vec<OracleEntry>),
    Single(OracleEntry),
}

/// Candidates keyed by normalized field name. Each field carries one
/// oracle-resolved candidate, or several raw per-source candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandidateSet {
    fields: BTreeMap<String, Vec<Candidate>>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate under its (normalized) field name.
    pub fn push(&mut self, candidate: Candidate) {
        self.fields
            .entry(candidate.field_name.clone())
            .or_default()
            .push(candidate);
    }

    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut set = Self::new();
        for candidate in candidates {
            set.push(candidate);
        }
        set
    }

    /// Parse the oracle's JSON object (`{field: {value, citations, ...}}` or
    /// `{field: [{value, source, ...}, ...]}`).
    pub fn from_oracle_json(raw: &str) -> Result<Self, ReconcileError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ReconcileError::OracleContract(format!("invalid JSON: {e}")))?;
        Self::from_oracle_value(value)
    }

    pub fn from_oracle_value(value: serde_json::Value) -> Result<Self, ReconcileError> {
        let serde_json::Value::Object(map) = value else {
            return Err(ReconcileError::OracleContract(
                "top-level value must be an object keyed by field name".into(),
            ));
        };

        let mut set = Self::new();
        for (raw_name, entry) in map {
            let name = normalize_name(&raw_name);
            if set.fields.contains_key(&name) {
                return Err(ReconcileError::OracleContract(format!(
                    "field '{name}' appears more than once after normalization"
                )));
            }
            let parsed: OracleField = serde_json::from_value(entry).map_err(|e| {
                ReconcileError::OracleContract(format!("field '{name}': {e}"))
            })?;
            let entries = match parsed {
                OracleField::PerSource(entries) if entries.is_empty() => {
                    return Err(ReconcileError::OracleContract(format!(
                        "field '{name}' has an empty candidate list"
                    )))
                }
                OracleField::PerSource(entries) => entries,
                OracleField::Single(entry) => vec![entry],
            };
            let candidates = entries
                .into_iter()
                .map(|entry| entry.into_candidate(&name))
                .collect();
            set.fields.insert(name, candidates);
        }
        Ok(set)
    }

    /// Parse oracle output that may carry prose around the JSON object.
    pub fn from_oracle_text(text: &str) -> Result<Self, ReconcileError> {
        let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
            return Err(ReconcileError::OracleContract("no JSON object found".into()));
        };
        if end < start {
            return Err(ReconcileError::OracleContract("no JSON object found".into()));
        }
        Self::from_oracle_json(&text[start..=end])
    }

    pub fn get(&self, name: &str) -> Option<&[Candidate]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Candidate])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ═══════════════════════════════════════════
// Reconciled answers
// ═══════════════════════════════════════════

/// Final answer per normalized field name: null, or format-valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconciledAnswers {
    answers: BTreeMap<String, Option<CandidateValue>>,
}

impl ReconciledAnswers {
    pub fn insert(&mut self, name: &str, value: Option<CandidateValue>) {
        self.answers.insert(name.to_string(), value);
    }

    /// `None` when the field is absent, `Some(None)` when answered null.
    pub fn get(&self, name: &str) -> Option<Option<&CandidateValue>> {
        self.answers.get(name).map(Option::as_ref)
    }

    /// Scalar value with null and the null sentinel folded to `None`.
    pub fn component(&self, name: &str) -> Option<String> {
        self.answers
            .get(name)?
            .as_ref()
            .filter(|v| !v.is_null_like())
            .map(CandidateValue::to_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.answers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&CandidateValue>)> {
        self.answers.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn answered(&self) -> usize {
        self.answers.values().filter(|v| v.is_some()).count()
    }
}
