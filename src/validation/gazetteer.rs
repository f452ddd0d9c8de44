//! Postal-code gazetteer: postal code → place and first-level region.
//!
//! Data comes from GeoNames postal dumps (tab-separated: country code,
//! postal code, place name, admin name1, admin code1, ...). Canadian dumps
//! are keyed by forward sortation area (first three characters).

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Us,
    Ca,
}

impl Country {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Ca => "CA",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "US" => Some(Self::Us),
            "CA" => Some(Self::Ca),
            _ => None,
        }
    }

    pub fn all() -> &'static [Country] {
        &[Self::Us, Self::Ca]
    }

    /// Lookup key for a postal code in this country's dump.
    pub fn postal_key(&self, postal_code: &str) -> String {
        let compact: String = postal_code
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        match self {
            Self::Ca => compact.chars().take(3).collect(),
            Self::Us => compact.chars().take(5).collect(),
        }
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostalRecord {
    pub place_name: String,
    pub region_name: String,
    /// Two-letter state / province code.
    pub region_code: String,
}

/// Region gazetteer capability. Read-only after construction.
pub trait Gazetteer: Send + Sync {
    fn lookup(&self, country: Country, postal_code: &str) -> Option<PostalRecord>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryGazetteer {
    entries: HashMap<(Country, String), PostalRecord>,
}

impl InMemoryGazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, country: Country, postal_code: &str, record: PostalRecord) {
        self.entries
            .entry((country, country.postal_key(postal_code)))
            .or_insert(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add every row of a GeoNames postal dump. Rows for other countries are ignored.
    pub fn extend_from_geonames<R: BufRead>(&mut self, reader: R) -> Result<usize, ValidationError> {
        let mut added = 0;
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 5 {
                return Err(ValidationError::Gazetteer(format!(
                    "line {}: expected at least 5 tab-separated columns, got {}",
                    line_no + 1,
                    cols.len()
                )));
            }
            let Some(country) = Country::from_code(cols[0]) else {
                continue;
            };
            self.insert(
                country,
                cols[1],
                PostalRecord {
                    place_name: cols[2].trim().to_string(),
                    region_name: cols[3].trim().to_string(),
                    region_code: cols[4].trim().to_ascii_uppercase(),
                },
            );
            added += 1;
        }
        Ok(added)
    }

    pub fn from_geonames<R: BufRead>(reader: R) -> Result<Self, ValidationError> {
        let mut gazetteer = Self::new();
        gazetteer.extend_from_geonames(reader)?;
        Ok(gazetteer)
    }

    /// Load `US.txt` and `CA.txt` from a directory; missing files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self, ValidationError> {
        let mut gazetteer = Self::new();
        for country in Country::all() {
            let path = dir.join(format!("{}.txt", country.as_str()));
            if !path.exists() {
                tracing::debug!(path = %path.display(), "Gazetteer file absent");
                continue;
            }
            let file = std::fs::File::open(&path)?;
            let added = gazetteer.extend_from_geonames(std::io::BufReader::new(file))?;
            tracing::info!(country = %country, entries = added, "Gazetteer loaded");
        }
        Ok(gazetteer)
    }
}

impl Gazetteer for InMemoryGazetteer {
    fn lookup(&self, country: Country, postal_code: &str) -> Option<PostalRecord> {
        self.entries
            .get(&(country, country.postal_key(postal_code)))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "CA\tK7L\tKingston\tOntario\tON\t\t\t\t\t44.2\t-76.5\t6\n\
US\t62704\tSpringfield\tIllinois\tIL\tSangamon\t167\t\t\t39.7\t-89.6\t4\n\
FR\t75001\tParis\tIle-de-France\t11\n";

    #[test]
    fn parses_geonames_rows() {
        let gazetteer = InMemoryGazetteer::from_geonames(SAMPLE.as_bytes()).unwrap();
        assert_eq!(gazetteer.len(), 2);
        let kingston = gazetteer.lookup(Country::Ca, "k7l 3v8").unwrap();
        assert_eq!(kingston.place_name, "Kingston");
        assert_eq!(kingston.region_code, "ON");
        let springfield = gazetteer.lookup(Country::Us, "62704-1234").unwrap();
        assert_eq!(springfield.region_code, "IL");
    }

    #[test]
    fn short_rows_rejected() {
        let err = InMemoryGazetteer::from_geonames("CA\tK7L\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn postal_keys_normalized() {
        assert_eq!(Country::Ca.postal_key("k7l 3v8"), "K7L");
        assert_eq!(Country::Us.postal_key("62704-1234"), "62704");
    }

    #[test]
    fn loads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CA.txt"), "CA\tM5V\tToronto\tOntario\tON\n").unwrap();
        let gazetteer = InMemoryGazetteer::load_dir(dir.path()).unwrap();
        assert_eq!(gazetteer.len(), 1);
        assert!(gazetteer.lookup(Country::Us, "10001").is_none());
    }
}
