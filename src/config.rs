use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::validation::AgeWindow;

/// Application-level constants
pub const APP_NAME: &str = "FormFill";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Country calling code used to synthesise placeholder numbers for area-code lookups.
pub const DEFAULT_COUNTRY_CALLING_CODE: &str = "1";

/// Get the application data directory
/// ~/FormFill/ on all platforms, falling back to the working directory when no home exists.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the gazetteer directory (GeoNames postal dumps, one file per country: US.txt, CA.txt)
pub fn gazetteer_dir() -> PathBuf {
    app_data_dir().join("gazetteer")
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "formfill=info"
}

// ═══════════════════════════════════════════════════════════
// Run configuration
// ═══════════════════════════════════════════════════════════

/// What to do when an area code does not resolve to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaCodePolicy {
    /// Any non-region lookup result fails the run.
    Reject,
    /// Log and record in the report, keep the value.
    Warn,
    /// Skip the lookup entirely.
    Ignore,
}

/// How the source priority table participates in reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Trust the oracle's chosen value; the table only feeds the audit report.
    Advisory,
    /// Re-derive each value from raw per-source candidates using the table.
    Strict,
}

/// Reconciliation run configuration. Loaded once, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormFillConfig {
    pub age_window: AgeWindow,
    pub country_calling_code: String,
    pub area_code_policy: AreaCodePolicy,
    pub priority_policy: PriorityPolicy,
    /// Experimental: the address validator relies on a heuristic country guess.
    pub validate_addresses: bool,
    /// When true, a schema field with no oracle entry becomes an explicit null
    /// instead of failing the count check.
    pub allow_missing_candidates: bool,
    pub address_fields: Vec<String>,
}

impl Default for FormFillConfig {
    fn default() -> Self {
        Self {
            age_window: AgeWindow::default(),
            country_calling_code: DEFAULT_COUNTRY_CALLING_CODE.into(),
            area_code_policy: AreaCodePolicy::Reject,
            priority_policy: PriorityPolicy::Advisory,
            validate_addresses: false,
            allow_missing_candidates: false,
            address_fields: vec!["address".into()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl FormFillConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.age_window.min_age > self.age_window.max_age {
            return Err(ConfigError::Invalid(format!(
                "age_window.min_age ({}) exceeds max_age ({})",
                self.age_window.min_age, self.age_window.max_age
            )));
        }
        if self.country_calling_code.is_empty()
            || !self.country_calling_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "country_calling_code must be digits, got '{}'",
                self.country_calling_code
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("FormFill"));
    }

    #[test]
    fn gazetteer_dir_under_app_data() {
        let dir = gazetteer_dir();
        assert!(dir.starts_with(app_data_dir()));
        assert!(dir.ends_with("gazetteer"));
    }

    #[test]
    fn defaults_match_reference_form_rules() {
        let config = FormFillConfig::default();
        assert_eq!(config.age_window.min_age, 0);
        assert_eq!(config.age_window.max_age, 150);
        assert_eq!(config.country_calling_code, "1");
        assert_eq!(config.area_code_policy, AreaCodePolicy::Reject);
        assert_eq!(config.priority_policy, PriorityPolicy::Advisory);
        assert!(!config.validate_addresses);
        assert!(!config.allow_missing_candidates);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = FormFillConfig::from_json_str(
            r#"{"area_code_policy": "warn", "age_window": {"min_age": 18, "max_age": 99}}"#,
        )
        .unwrap();
        assert_eq!(config.area_code_policy, AreaCodePolicy::Warn);
        assert_eq!(config.age_window.min_age, 18);
        assert_eq!(config.country_calling_code, "1");
    }

    #[test]
    fn inverted_age_window_rejected() {
        let err = FormFillConfig::from_json_str(r#"{"age_window": {"min_age": 90, "max_age": 10}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_digit_calling_code_rejected() {
        assert!(FormFillConfig::from_json_str(r#"{"country_calling_code": "+1"}"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formfill.json");
        std::fs::write(&path, r#"{"priority_policy": "strict"}"#).unwrap();
        let config = FormFillConfig::from_json_file(&path).unwrap();
        assert_eq!(config.priority_policy, PriorityPolicy::Strict);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
