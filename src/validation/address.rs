//! Best-effort postal/address validation (experimental).
//!
//! The country guess is a heuristic: a postal code containing letters is
//! taken as Canadian, anything else as American. A region-aware address
//! parser should replace it before this check is relied on as a hard gate.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::gazetteer::{Country, Gazetteer};

static CA_POSTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]\d[A-Z])[ -]?(\d[A-Z]\d)\b").expect("valid regex")
});

static US_ZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").expect("valid regex"));

const REGION_NAMES: &[(&str, &str)] = &[
    ("alberta", "AB"),
    ("british columbia", "BC"),
    ("manitoba", "MB"),
    ("new brunswick", "NB"),
    ("newfoundland and labrador", "NL"),
    ("newfoundland", "NL"),
    ("nova scotia", "NS"),
    ("northwest territories", "NT"),
    ("nunavut", "NU"),
    ("ontario", "ON"),
    ("prince edward island", "PE"),
    ("quebec", "QC"),
    ("québec", "QC"),
    ("saskatchewan", "SK"),
    ("yukon", "YT"),
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

/// Two-letter code for a region written as a code or a full name.
pub fn region_code(region: &str) -> Option<String> {
    let trimmed = region.trim().trim_end_matches('.');
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(trimmed.to_ascii_uppercase());
    }
    let lower = trimmed.to_lowercase();
    REGION_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| code.to_string())
}

/// Heuristic country guess from the postal code alone.
pub fn detect_country(postal_code: &str) -> Country {
    if postal_code.chars().any(|c| c.is_alphabetic()) {
        Country::Ca
    } else {
        Country::Us
    }
}

/// Postal code and region pulled out of a free-form address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAddress {
    pub postal_code: String,
    pub region: String,
}

/// Find the last postal code in the address and the region written just before it.
pub fn parse_address(address: &str) -> Option<ParsedAddress> {
    let (start, postal_code) = match CA_POSTAL.captures_iter(address).last() {
        Some(caps) => {
            let whole = caps.get(0)?;
            (whole.start(), format!("{} {}", &caps[1], &caps[2]).to_ascii_uppercase())
        }
        None => {
            let caps = US_ZIP.captures_iter(address).last()?;
            (caps.get(0)?.start(), caps[1].to_string())
        }
    };

    let before = address[..start].trim_end().trim_end_matches(',').trim_end();
    let segment = before.rsplit(',').next().unwrap_or_default().trim();
    let region = region_code(segment).or_else(|| {
        segment
            .split_whitespace()
            .last()
            .and_then(region_code)
    })?;

    Some(ParsedAddress {
        postal_code,
        region,
    })
}

/// Outcome of an address check.
///
/// `outcome == false`: the postal code could not be resolved at all.
/// `valid == false` with `outcome == true`: resolved, but the region disagrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressValidation {
    pub valid: bool,
    pub postal_code: String,
    pub expected_region: Option<String>,
    pub provided_region: String,
    pub city: Option<String>,
    pub country: Option<Country>,
    pub outcome: bool,
}

impl AddressValidation {
    fn unresolved(postal_code: &str, provided_region: &str, country: Option<Country>) -> Self {
        Self {
            valid: false,
            postal_code: postal_code.to_string(),
            expected_region: None,
            provided_region: provided_region.to_string(),
            city: None,
            country,
            outcome: false,
        }
    }
}

/// Check a postal code against the declared state / province.
pub fn validate_postal_region(
    gazetteer: &dyn Gazetteer,
    postal_code: &str,
    region: &str,
    country: Option<Country>,
) -> AddressValidation {
    let country = country.unwrap_or_else(|| detect_country(postal_code));
    let provided = region_code(region).unwrap_or_else(|| region.trim().to_uppercase());

    let Some(record) = gazetteer.lookup(country, postal_code) else {
        tracing::debug!(postal_code = %postal_code, country = %country, "Postal code not in gazetteer");
        return AddressValidation::unresolved(postal_code, &provided, Some(country));
    };

    AddressValidation {
        valid: record.region_code == provided,
        postal_code: postal_code.to_string(),
        expected_region: Some(record.region_code),
        provided_region: provided,
        city: Some(record.place_name),
        country: Some(country),
        outcome: true,
    }
}

/// Parse a free-form address, then check its postal code against its region.
pub fn validate_address(gazetteer: &dyn Gazetteer, address: &str) -> AddressValidation {
    match parse_address(address) {
        Some(parsed) => validate_postal_region(gazetteer, &parsed.postal_code, &parsed.region, None),
        None => AddressValidation::unresolved("", "", None),
    }
}
