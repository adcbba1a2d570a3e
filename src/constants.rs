//! Environment variable names and their defaults.

pub const ENV_SOURCE_FILE: &str = "INPUT_CSV_FILE";
pub const ENV_CLEANED_FILE: &str = "OUTPUT_CSV_FILE";
pub const ENV_STORE_URI: &str = "STORE_URI";
pub const ENV_DATABASE: &str = "DB_NAME";
pub const ENV_COLLECTION: &str = "COLLECTION_NAME";
pub const ENV_MAX_BULK_INSERT: &str = "MAX_BULK_INSERT";

pub const DEFAULT_SOURCE_FILE: &str = "healthcare_dataset.csv";
pub const DEFAULT_CLEANED_FILE: &str = "healthcare_dataset_cleaned.csv";
pub const DEFAULT_STORE_URI: &str = "sqlite://data";
pub const DEFAULT_DATABASE: &str = "healthcare";
pub const DEFAULT_COLLECTION: &str = "patients";
pub const DEFAULT_MAX_BULK_INSERT: usize = 1_000_000;

/// Honorifics stripped from the front of a patient name.
pub const HONORIFICS: [&str; 4] = ["Mr.", "Mrs.", "Dr.", "Miss"];
