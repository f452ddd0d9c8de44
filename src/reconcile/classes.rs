//! Validated field classes: which schema fields form a phone number, a date
//! triplet, or a free-form address.

use serde::{Deserialize, Serialize};

use crate::form::FormSchema;

const DAY_SUFFIX: &str = "_d";
const MONTH_SUFFIX: &str = "_m";
const YEAR_SUFFIX: &str = "_y";
const AREA_CODE_PREFIX: &str = "areacode";

/// Triplets that legitimately hold future dates (calendar check only).
const FUTURE_ALLOWED: &[&str] = &["date_return"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneGroup {
    pub area_code: String,
    pub first: String,
    pub second: String,
}

impl PhoneGroup {
    pub fn new(area_code: &str, first: &str, second: &str) -> Self {
        Self {
            area_code: area_code.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn fields(&self) -> [&str; 3] {
        [&self.area_code, &self.first, &self.second]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTriplet {
    pub prefix: String,
    pub day: String,
    pub month: String,
    pub year: String,
    /// Past date within the age window, versus any valid calendar date.
    pub require_past: bool,
}

impl DateTriplet {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            day: format!("{prefix}{DAY_SUFFIX}"),
            month: format!("{prefix}{MONTH_SUFFIX}"),
            year: format!("{prefix}{YEAR_SUFFIX}"),
            require_past: !FUTURE_ALLOWED.contains(&prefix),
        }
    }

    pub fn fields(&self) -> [&str; 3] {
        [&self.day, &self.month, &self.year]
    }
}

/// Field classes the engine validates. Anything else passes through.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldClasses {
    pub phone_groups: Vec<PhoneGroup>,
    /// Area code fields not covered by a phone group.
    #[serde(default)]
    pub area_codes: Vec<String>,
    pub date_triplets: Vec<DateTriplet>,
    pub address_fields: Vec<String>,
}

impl FieldClasses {
    /// Classes of the reference intake form.
    pub fn standard() -> Self {
        Self {
            phone_groups: vec![
                PhoneGroup::new("areacode", "phonea", "phoneb"),
                PhoneGroup::new("areacode1", "phonea1", "phoneb1"),
            ],
            area_codes: Vec::new(),
            date_triplets: ["date_of_birth", "date_last", "date_return", "date_childbirth"]
                .iter()
                .map(|p| DateTriplet::from_prefix(p))
                .collect(),
            address_fields: vec!["address".to_string()],
        }
    }

    /// Standard classes restricted to groups whose every member is in the
    /// schema, plus any other `<prefix>_d/_m/_y` triplet the schema holds.
    pub fn detect(schema: &FormSchema, address_fields: &[String]) -> Self {
        let standard = Self::standard();
        let complete = |fields: [&str; 3]| fields.iter().all(|f| schema.contains(f));

        let phone_groups: Vec<PhoneGroup> = standard
            .phone_groups
            .into_iter()
            .filter(|g| complete(g.fields()))
            .collect();

        let area_codes: Vec<String> = schema
            .names()
            .filter(|name| name.starts_with(AREA_CODE_PREFIX))
            .filter(|name| !phone_groups.iter().any(|g| g.area_code == *name))
            .map(str::to_string)
            .collect();

        let mut date_triplets: Vec<DateTriplet> = Vec::new();
        for name in schema.names() {
            let Some(prefix) = name.strip_suffix(DAY_SUFFIX) else {
                continue;
            };
            if prefix.is_empty() {
                continue;
            }
            let triplet = DateTriplet::from_prefix(prefix);
            if complete(triplet.fields()) {
                date_triplets.push(triplet);
            }
        }

        let address_fields = address_fields
            .iter()
            .filter(|f| schema.contains(f))
            .cloned()
            .collect();

        let classes = Self {
            phone_groups,
            area_codes,
            date_triplets,
            address_fields,
        };
        tracing::debug!(
            phone_groups = classes.phone_groups.len(),
            area_codes = classes.area_codes.len(),
            date_triplets = classes.date_triplets.len(),
            address_fields = classes.address_fields.len(),
            "Field classes detected"
        );
        classes
    }

    pub fn is_empty(&self) -> bool {
        self.phone_groups.is_empty()
            && self.area_codes.is_empty()
            && self.date_triplets.is_empty()
            && self.address_fields.is_empty()
    }
}
