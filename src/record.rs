use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::decimal::FixedDecimal;
use crate::error::RecordError;
use crate::storage::{Document, FieldValue};

/// Date format used by both date columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// chrono accepts unpadded fields, signs and short years; the stored form does not
static DATE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern is a valid regex"));

/// The known columns of a patient record, with their exact header spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Age,
    Gender,
    MedicalCondition,
    DateOfAdmission,
    Doctor,
    Hospital,
    InsuranceProvider,
    BillingAmount,
    AdmissionType,
    DischargeDate,
    Medication,
    TestResults,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Name,
        Field::Age,
        Field::Gender,
        Field::MedicalCondition,
        Field::DateOfAdmission,
        Field::Doctor,
        Field::Hospital,
        Field::InsuranceProvider,
        Field::BillingAmount,
        Field::AdmissionType,
        Field::DischargeDate,
        Field::Medication,
        Field::TestResults,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Age => "Age",
            Field::Gender => "Gender",
            Field::MedicalCondition => "Medical Condition",
            Field::DateOfAdmission => "Date of Admission",
            Field::Doctor => "Doctor",
            Field::Hospital => "Hospital",
            Field::InsuranceProvider => "Insurance Provider",
            Field::BillingAmount => "Billing Amount",
            Field::AdmissionType => "Admission Type",
            Field::DischargeDate => "Discharge Date",
            Field::Medication => "Medication",
            Field::TestResults => "Test Results",
        }
    }

    pub fn from_header(header: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.header() == header)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Where each column of a file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Known(Field),
    /// A column outside the known field list, carried through as text.
    /// The index is its position among pass-through columns.
    PassThrough(usize),
}

/// The ordered column list of a CSV file, resolved against [`Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    columns: Vec<Column>,
    positions: [usize; 13],
}

impl Header {
    /// Resolves a header row. Every known field must be present exactly once
    /// and column names must be unique.
    pub fn resolve<I, S>(names: I) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        // names become JSON path keys in the store
        let quoted: Vec<&str> = names
            .iter()
            .filter(|n| n.contains('"'))
            .map(String::as_str)
            .collect();
        if !quoted.is_empty() {
            return Err(format!(
                "column names may not contain '\"': {}",
                quoted.join(", ")
            ));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = names
            .iter()
            .filter(|n| !seen.insert(n.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            return Err(format!("duplicate columns: {}", duplicates.join(", ")));
        }

        let mut positions = [usize::MAX; 13];
        let mut columns = Vec::with_capacity(names.len());
        let mut pass_through = 0;
        for (pos, name) in names.iter().enumerate() {
            match Field::from_header(name) {
                Some(field) => {
                    positions[field.index()] = pos;
                    columns.push(Column::Known(field));
                }
                None => {
                    columns.push(Column::PassThrough(pass_through));
                    pass_through += 1;
                }
            }
        }

        let missing: Vec<&str> = Field::ALL
            .iter()
            .filter(|f| positions[f.index()] == usize::MAX)
            .map(|f| f.header())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing columns: {}", missing.join(", ")));
        }

        Ok(Self {
            names,
            columns,
            positions,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn position(&self, field: Field) -> usize {
        self.positions[field.index()]
    }
}

/// One source row, still all text, addressed through its file's [`Header`].
#[derive(Debug, Clone)]
pub struct RawRecord<'h> {
    header: &'h Header,
    values: Vec<String>,
}

impl<'h> RawRecord<'h> {
    pub fn new(header: &'h Header, values: Vec<String>) -> Self {
        Self { header, values }
    }

    pub fn get(&self, field: Field) -> Result<&str, RecordError> {
        self.values
            .get(self.header.position(field))
            .map(String::as_str)
            .ok_or(RecordError::MissingValue {
                field: field.header(),
            })
    }

    /// Values of the pass-through columns, in header order. Short rows yield
    /// empty strings for the columns they lack.
    pub fn pass_through(&self) -> Vec<String> {
        self.header
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Column::PassThrough(_)))
            .map(|(pos, _)| self.values.get(pos).cloned().unwrap_or_default())
            .collect()
    }
}

/// A normalized record, as written to the cleaned artifact.
///
/// Equality covers every column, pass-through values included, which is
/// exactly the duplicate definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CleanRecord {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub medical_condition: String,
    pub date_of_admission: String,
    pub doctor: String,
    pub hospital: String,
    pub insurance_provider: String,
    pub billing_amount: FixedDecimal,
    pub admission_type: String,
    pub discharge_date: String,
    pub medication: String,
    pub test_results: String,
    pub pass_through: Vec<String>,
}

impl CleanRecord {
    pub fn text(&self, field: Field) -> String {
        match field {
            Field::Name => self.name.clone(),
            Field::Age => self.age.clone(),
            Field::Gender => self.gender.clone(),
            Field::MedicalCondition => self.medical_condition.clone(),
            Field::DateOfAdmission => self.date_of_admission.clone(),
            Field::Doctor => self.doctor.clone(),
            Field::Hospital => self.hospital.clone(),
            Field::InsuranceProvider => self.insurance_provider.clone(),
            Field::BillingAmount => self.billing_amount.to_string(),
            Field::AdmissionType => self.admission_type.clone(),
            Field::DischargeDate => self.discharge_date.clone(),
            Field::Medication => self.medication.clone(),
            Field::TestResults => self.test_results.clone(),
        }
    }

    /// Row values in `header` column order.
    pub fn to_row(&self, header: &Header) -> Vec<String> {
        header
            .columns()
            .iter()
            .map(|column| match column {
                Column::Known(field) => self.text(*field),
                Column::PassThrough(i) => self.pass_through.get(*i).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// A record coerced to storage-native types by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub medical_condition: String,
    pub date_of_admission: NaiveDate,
    pub doctor: String,
    pub hospital: String,
    pub insurance_provider: String,
    pub billing_amount: FixedDecimal,
    pub admission_type: String,
    pub discharge_date: NaiveDate,
    pub medication: String,
    pub test_results: String,
    pub pass_through: Vec<String>,
}

impl PatientRecord {
    /// Coerces one cleaned-artifact row. Each failing field yields a
    /// [`RecordError`] naming the column and the offending text.
    pub fn coerce(raw: &RawRecord<'_>) -> Result<Self, RecordError> {
        let age_text = raw.get(Field::Age)?;
        let age = age_text
            .trim()
            .parse::<u32>()
            .map_err(|_| RecordError::InvalidInteger {
                field: Field::Age.header(),
                value: age_text.to_string(),
            })?;

        let billing_text = raw.get(Field::BillingAmount)?;
        let billing_amount =
            FixedDecimal::parse_exact(billing_text).map_err(|e| RecordError::InvalidDecimal {
                field: Field::BillingAmount.header(),
                value: billing_text.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: raw.get(Field::Name)?.to_string(),
            age,
            gender: raw.get(Field::Gender)?.to_string(),
            medical_condition: raw.get(Field::MedicalCondition)?.to_string(),
            date_of_admission: parse_date(raw, Field::DateOfAdmission)?,
            doctor: raw.get(Field::Doctor)?.to_string(),
            hospital: raw.get(Field::Hospital)?.to_string(),
            insurance_provider: raw.get(Field::InsuranceProvider)?.to_string(),
            billing_amount,
            admission_type: raw.get(Field::AdmissionType)?.to_string(),
            discharge_date: parse_date(raw, Field::DischargeDate)?,
            medication: raw.get(Field::Medication)?.to_string(),
            test_results: raw.get(Field::TestResults)?.to_string(),
            pass_through: raw.pass_through(),
        })
    }

    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::Name => FieldValue::Text(self.name.clone()),
            Field::Age => FieldValue::Int(i64::from(self.age)),
            Field::Gender => FieldValue::Text(self.gender.clone()),
            Field::MedicalCondition => FieldValue::Text(self.medical_condition.clone()),
            Field::DateOfAdmission => FieldValue::Date(self.date_of_admission),
            Field::Doctor => FieldValue::Text(self.doctor.clone()),
            Field::Hospital => FieldValue::Text(self.hospital.clone()),
            Field::InsuranceProvider => FieldValue::Text(self.insurance_provider.clone()),
            Field::BillingAmount => FieldValue::Decimal(self.billing_amount),
            Field::AdmissionType => FieldValue::Text(self.admission_type.clone()),
            Field::DischargeDate => FieldValue::Date(self.discharge_date),
            Field::Medication => FieldValue::Text(self.medication.clone()),
            Field::TestResults => FieldValue::Text(self.test_results.clone()),
        }
    }

    /// Builds the stored document, fields in `header` order.
    pub fn to_document(&self, header: &Header) -> Document {
        let mut doc = Document::new();
        for (name, column) in header.names().iter().zip(header.columns()) {
            let value = match column {
                Column::Known(field) => self.value(*field),
                Column::PassThrough(i) => {
                    FieldValue::Text(self.pass_through.get(*i).cloned().unwrap_or_default())
                }
            };
            doc.insert(name.clone(), value);
        }
        doc
    }
}

fn parse_date(raw: &RawRecord<'_>, field: Field) -> Result<NaiveDate, RecordError> {
    let text = raw.get(field)?;
    let invalid = || RecordError::InvalidDate {
        field: field.header(),
        value: text.to_string(),
    };
    if !DATE_SHAPE.is_match(text) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| invalid())
}
