//! Per-record canonicalization of the source rows.
//!
//! Normalization is pure: the same raw row always yields the same
//! [`CleanRecord`] or the same [`RecordError`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::HONORIFICS;
use crate::decimal::FixedDecimal;
use crate::error::RecordError;
use crate::record::{CleanRecord, Field, RawRecord};

static HONORIFIC_PREFIX: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<String> = HONORIFICS.iter().map(|h| regex::escape(h)).collect();
    Regex::new(&format!(r"(?i)^(?:{})\s*", alternatives.join("|")))
        .expect("honorific pattern is a valid regex")
});

/// Upper-cases the first cased character of every run of cased characters and
/// lower-cases the rest. Anything uncased (spaces, digits, punctuation) ends a
/// run, so `o'neil-smith` becomes `O'Neil-Smith`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;
    for c in input.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased && in_word {
            out.extend(c.to_lowercase());
        } else if cased {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        in_word = cased;
    }
    out
}

/// Removes leading honorifics and surrounding whitespace. Stripping repeats so
/// that `Dr. Mrs. Ann` loses both titles.
pub fn strip_honorifics(name: &str) -> &str {
    let mut rest = name.trim();
    while let Some(m) = HONORIFIC_PREFIX.find(rest) {
        rest = rest[m.end()..].trim_start();
    }
    rest.trim_end()
}

pub fn normalize_name(name: &str) -> Result<String, RecordError> {
    let stripped = strip_honorifics(name);
    if stripped.is_empty() {
        return Err(RecordError::EmptyName);
    }
    Ok(title_case(stripped))
}

pub fn normalize_billing_amount(value: &str) -> Result<FixedDecimal, RecordError> {
    FixedDecimal::parse_rounded(value).map_err(|e| RecordError::InvalidDecimal {
        field: Field::BillingAmount.header(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Canonicalizes one source row. Age and both dates pass through untouched;
/// the loader coerces them.
pub fn normalize_record(raw: &RawRecord<'_>) -> Result<CleanRecord, RecordError> {
    let title = |field: Field| raw.get(field).map(title_case);

    Ok(CleanRecord {
        name: normalize_name(raw.get(Field::Name)?)?,
        age: raw.get(Field::Age)?.to_string(),
        gender: title(Field::Gender)?,
        medical_condition: title(Field::MedicalCondition)?,
        date_of_admission: raw.get(Field::DateOfAdmission)?.to_string(),
        doctor: title(Field::Doctor)?,
        hospital: title(Field::Hospital)?,
        insurance_provider: title(Field::InsuranceProvider)?,
        billing_amount: normalize_billing_amount(raw.get(Field::BillingAmount)?)?,
        admission_type: title(Field::AdmissionType)?,
        discharge_date: raw.get(Field::DischargeDate)?.to_string(),
        medication: title(Field::Medication)?,
        test_results: title(Field::TestResults)?,
        pass_through: raw.pass_through(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Header;

    #[test]
    fn test_title_case_matches_word_boundaries() {
        assert_eq!(title_case("bobby JACKSON"), "Bobby Jackson");
        assert_eq!(title_case("o'neil-smith"), "O'Neil-Smith");
        assert_eq!(title_case("sons and miller"), "Sons And Miller");
        assert_eq!(title_case("type 2diabetes"), "Type 2Diabetes");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_strip_honorifics() {
        assert_eq!(strip_honorifics("Mr. John Smith"), "John Smith");
        assert_eq!(strip_honorifics("mrs.jane doe"), "jane doe");
        assert_eq!(strip_honorifics("DR. Who"), "Who");
        assert_eq!(strip_honorifics("  Dr. Mrs.  Ann Lee "), "Ann Lee");
        assert_eq!(strip_honorifics("Mr John"), "Mr John");
        assert_eq!(strip_honorifics("Andrew Mr. Smith"), "Andrew Mr. Smith");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Mr. john SMITH").unwrap(), "John Smith");
        assert_eq!(normalize_name("Dr. "), Err(RecordError::EmptyName));
        assert_eq!(normalize_name("   "), Err(RecordError::EmptyName));
    }

    fn header() -> Header {
        Header::resolve([
            "Name",
            "Age",
            "Gender",
            "Blood Type",
            "Medical Condition",
            "Date of Admission",
            "Doctor",
            "Hospital",
            "Insurance Provider",
            "Billing Amount",
            "Room Number",
            "Admission Type",
            "Discharge Date",
            "Medication",
            "Test Results",
        ])
        .unwrap()
    }

    fn values(name: &str, billing: &str) -> Vec<String> {
        [
            name, "30", "male", "b-", "cancer", "2024-01-31", "matthew smith", "sons and miller",
            "blue cross", billing, "328", "urgent", "2024-02-02", "paracetamol", "normal",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_normalize_record() {
        let header = header();
        let raw = RawRecord::new(&header, values("Mr. John Smith", "100.005"));
        let clean = normalize_record(&raw).unwrap();

        assert_eq!(clean.name, "John Smith");
        assert_eq!(clean.billing_amount.to_string(), "100.01");
        assert_eq!(clean.gender, "Male");
        assert_eq!(clean.hospital, "Sons And Miller");
        assert_eq!(clean.insurance_provider, "Blue Cross");
        assert_eq!(clean.age, "30");
        assert_eq!(clean.date_of_admission, "2024-01-31");
        // pass-through columns are not title-cased
        assert_eq!(clean.pass_through, vec!["b-".to_string(), "328".to_string()]);
    }

    #[test]
    fn test_normalize_record_skips_bad_amount() {
        let header = header();
        let raw = RawRecord::new(&header, values("Ann Lee", "abc"));
        let err = normalize_record(&raw).unwrap_err();
        assert!(matches!(err, RecordError::InvalidDecimal { field: "Billing Amount", .. }));
        assert!(err.to_string().contains("'abc'"));
    }
}
