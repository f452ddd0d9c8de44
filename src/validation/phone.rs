//! Phone segment validation: a North American number split into a 3-digit
//! area code, a 3-digit first group and a 4-digit second group.

use serde::Serialize;

use super::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneSegment {
    AreaCode,
    FirstGroup,
    SecondGroup,
}

impl PhoneSegment {
    pub fn digits(&self) -> usize {
        match self {
            Self::AreaCode => 3,
            Self::FirstGroup => 3,
            Self::SecondGroup => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AreaCode => "area code",
            Self::FirstGroup => "first group",
            Self::SecondGroup => "second group",
        }
    }
}

/// A phone number whose three segments all passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber {
    pub area_code: String,
    pub first: String,
    pub second: String,
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.area_code, self.first, self.second)
    }
}

/// Check one segment: exactly the segment's digit count, ASCII decimal digits only.
pub fn validate_segment(segment: PhoneSegment, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::InvalidFormat(format!(
            "missing phone {}",
            segment.as_str()
        )));
    };
    let expected = segment.digits();
    if value.chars().count() != expected || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat(format!(
            "phone {} must be exactly {expected} digits, got '{value}'",
            segment.as_str()
        )));
    }
    Ok(())
}

/// Validate all three segments of a phone number.
pub fn validate_phone_segments(
    area_code: Option<&str>,
    first: Option<&str>,
    second: Option<&str>,
) -> Result<PhoneNumber, ValidationError> {
    validate_segment(PhoneSegment::AreaCode, area_code)?;
    validate_segment(PhoneSegment::FirstGroup, first)?;
    validate_segment(PhoneSegment::SecondGroup, second)?;

    Ok(PhoneNumber {
        area_code: area_code.unwrap_or_default().to_string(),
        first: first.unwrap_or_default().to_string(),
        second: second.unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_number_passes() {
        let phone = validate_phone_segments(Some("613"), Some("656"), Some("5890")).unwrap();
        assert_eq!(phone.to_string(), "613-656-5890");
    }

    #[test]
    fn short_area_code_fails() {
        let err = validate_phone_segments(Some("61"), Some("656"), Some("5890")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat(_)));
    }

    #[test]
    fn non_digit_fails() {
        assert!(validate_phone_segments(Some("613"), Some("65A"), Some("5890")).is_err());
    }

    #[test]
    fn missing_segment_fails() {
        let err = validate_phone_segments(Some("613"), None, Some("5890")).unwrap_err();
        assert!(err.to_string().contains("missing phone first group"));
    }

    #[test]
    fn second_group_needs_four_digits() {
        assert!(validate_segment(PhoneSegment::SecondGroup, Some("589")).is_err());
        assert!(validate_segment(PhoneSegment::SecondGroup, Some("58901")).is_err());
        assert!(validate_segment(PhoneSegment::SecondGroup, Some("5890")).is_ok());
    }

    #[test]
    fn separators_and_unicode_digits_rejected() {
        assert!(validate_segment(PhoneSegment::AreaCode, Some("6-3")).is_err());
        assert!(validate_segment(PhoneSegment::AreaCode, Some("٦١٣")).is_err());
        assert!(validate_segment(PhoneSegment::AreaCode, Some(" 613")).is_err());
    }
}
