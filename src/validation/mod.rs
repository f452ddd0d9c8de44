//! Field validators: phone segments, area codes, date triplets and
//! postal addresses. Validators are pure functions over read-only lookup
//! tables and can be called from any thread.

pub mod phone;
pub mod area_code;
pub mod nanp;
pub mod date;
pub mod gazetteer;
pub mod address;

pub use phone::{validate_phone_segments, validate_segment, PhoneNumber, PhoneSegment};
pub use area_code::{validate_area_code, AreaCodeLookup, LookupError, NumberingPlan};
pub use nanp::{NanpPlan, NANP_CALLING_CODE};
pub use date::{
    age_on, is_null_sentinel, parse_date_triplet, validate_calendar_triplet, validate_date_triplet,
    AgeWindow, DateError, DateTripletOutcome, NULL_SENTINEL,
};
pub use gazetteer::{Country, Gazetteer, InMemoryGazetteer, PostalRecord};
pub use address::{
    detect_country, parse_address, validate_address, validate_postal_region, AddressValidation,
    ParsedAddress,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Date(#[from] DateError),

    #[error("Gazetteer error: {0}")]
    Gazetteer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_errors_convert_transparently() {
        let err: ValidationError = DateError::FutureDate.into();
        assert_eq!(err.to_string(), "Future date");
    }
}
