//! Area-code plausibility: synthesise a placeholder number around the area
//! code and ask a numbering plan where it rings.
//!
//! This is a soft signal. The result is data, and callers decide whether
//! anything other than a region description is fatal.

use serde::Serialize;

/// Subscriber digits appended to the area code to form a placeholder number.
pub const PLACEHOLDER_SUBSCRIBER: &str = "5551212";

/// Failure inside a numbering-plan lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("numbering plan lookup failed: {0}")]
pub struct LookupError(pub String);

/// Numbering-plan geocoding capability. Implementations are read-only after construction.
pub trait NumberingPlan: Send + Sync {
    /// Whether a national number has a possible length for the calling code.
    fn is_possible(&self, calling_code: &str, national_number: &str) -> bool;

    /// Human-readable region for the number, `None` when the plan has no geography for it.
    fn describe(
        &self,
        calling_code: &str,
        national_number: &str,
    ) -> Result<Option<String>, LookupError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "region", rename_all = "snake_case")]
pub enum AreaCodeLookup {
    Region(String),
    InvalidAreaCode,
    InvalidFormat,
    Error,
}

impl AreaCodeLookup {
    pub fn is_region(&self) -> bool {
        matches!(self, Self::Region(_))
    }

    /// Region description, or the failure label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Region(region) => region,
            Self::InvalidAreaCode => "Invalid Area Code",
            Self::InvalidFormat => "Invalid Format",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for AreaCodeLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the region served by `area_code` under `calling_code`.
pub fn validate_area_code(
    plan: &dyn NumberingPlan,
    calling_code: &str,
    area_code: &str,
) -> AreaCodeLookup {
    let calling_code = calling_code.trim().trim_start_matches('+');
    let area_code = area_code.trim();

    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !is_digits(calling_code) || !is_digits(area_code) {
        return AreaCodeLookup::Error;
    }

    let national = format!("{area_code}{PLACEHOLDER_SUBSCRIBER}");
    if !plan.is_possible(calling_code, &national) {
        return AreaCodeLookup::InvalidFormat;
    }

    match plan.describe(calling_code, &national) {
        Ok(Some(region)) if !region.is_empty() => AreaCodeLookup::Region(region),
        Ok(_) => AreaCodeLookup::InvalidAreaCode,
        Err(e) => {
            tracing::warn!(
                calling_code = %calling_code,
                area_code = %area_code,
                error = %e,
                "Area code lookup failed"
            );
            AreaCodeLookup::Error
        }
    }
}
