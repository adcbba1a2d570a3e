//! Reading the source CSV and reading/writing the cleaned artifact.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{PipelineError, RecordError, Result};
use crate::record::{CleanRecord, Header};

const BOM: char = '\u{feff}';

/// One data row. `values` is an error when the row cannot be decoded as text.
#[derive(Debug)]
pub struct Row {
    pub line: u64,
    pub values: std::result::Result<Vec<String>, RecordError>,
}

/// Streaming reader over a CSV file whose header has been resolved.
pub struct CsvInput {
    path: PathBuf,
    header: Header,
    reader: csv::Reader<File>,
    row: csv::ByteRecord,
}

impl CsvInput {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = open_reader(path)?;
        let names = read_names(&mut reader, path)?;
        let header = Header::resolve(names).map_err(|message| PipelineError::InvalidHeader {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
            reader,
            row: csv::ByteRecord::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Next data row, or `None` at end of file. Blank lines are skipped.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let more = self
            .reader
            .read_byte_record(&mut self.row)
            .map_err(|source| PipelineError::Csv {
                path: self.path.clone(),
                source,
            })?;
        if !more {
            return Ok(None);
        }

        let line = self.row.position().map(|p| p.line()).unwrap_or_default();
        let values = self
            .row
            .iter()
            .map(|field| std::str::from_utf8(field).map(str::to_string))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| RecordError::InvalidUtf8);
        Ok(Some(Row { line, values }))
    }
}

/// The header row of a CSV file exactly as written, BOM removed.
pub fn read_header_names(path: &Path) -> Result<Vec<String>> {
    let mut reader = open_reader(path)?;
    read_names(&mut reader, path)
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::InputMissing {
            path: path.to_path_buf(),
        },
        _ => PipelineError::Io(e),
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file))
}

fn read_names(reader: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>> {
    let invalid = |message: &str| PipelineError::InvalidHeader {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let headers = reader
        .byte_headers()
        .map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    if headers.is_empty() {
        return Err(invalid("file has no header row"));
    }

    headers
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let name = std::str::from_utf8(raw).map_err(|_| invalid("header is not valid UTF-8"))?;
            let name = if i == 0 { name.trim_start_matches(BOM) } else { name };
            Ok(name.to_string())
        })
        .collect()
}

/// Where the cleaned artifact landed and what it contains.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub rows: usize,
    pub sha256: String,
}

/// Writes the cleaned artifact atomically: rows go to a hidden sibling file
/// that is renamed over `path` once complete.
pub fn write_cleaned(path: &Path, header: &Header, records: &[CleanRecord]) -> Result<ArtifactInfo> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = write_rows(&tmp, header, records) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;

    let sha256 = sha256_file(path)?;
    debug!("Wrote {} rows to {} (sha256 {})", records.len(), path.display(), sha256);
    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        rows: records.len(),
        sha256,
    })
}

fn write_rows(path: &Path, header: &Header, records: &[CleanRecord]) -> Result<()> {
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(header.names()).map_err(csv_err)?;
    for record in records {
        writer.write_record(record.to_row(header)).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cleaned.csv".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::FixedDecimal;

    const HEADER: &str = "Name,Age,Gender,Medical Condition,Date of Admission,Doctor,Hospital,Insurance Provider,Billing Amount,Admission Type,Discharge Date,Medication,Test Results";

    #[test]
    fn test_missing_file_is_input_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvInput::open(&dir.path().join("nope.csv")).err().unwrap();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
    }

    #[test]
    fn test_bom_is_stripped_and_short_rows_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(
            &path,
            format!("\u{feff}{HEADER}\nAnn,30,female,flu,2024-01-01,Bo,H,P,1.5,urgent,2024-01-02,Aspirin,Normal\nShort,1\n"),
        )
        .unwrap();

        let mut input = CsvInput::open(&path).unwrap();
        assert_eq!(input.header().names()[0], "Name");

        let first = input.next_row().unwrap().unwrap();
        assert_eq!(first.line, 2);
        assert_eq!(first.values.unwrap().len(), 13);

        let second = input.next_row().unwrap().unwrap();
        assert_eq!(second.values.unwrap(), vec!["Short".to_string(), "1".to_string()]);
        assert!(input.next_row().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_row_is_a_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        let mut bytes = format!("{HEADER}\n").into_bytes();
        bytes.extend_from_slice(b"\xff\xfe,30\n");
        fs::write(&path, bytes).unwrap();

        let mut input = CsvInput::open(&path).unwrap();
        let row = input.next_row().unwrap().unwrap();
        assert_eq!(row.values, Err(RecordError::InvalidUtf8));
    }

    #[test]
    fn test_header_missing_columns_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "Name,Age\nAnn,30\n").unwrap();
        let err = CsvInput::open(&path).err().unwrap();
        assert!(matches!(err, PipelineError::InvalidHeader { .. }));

        fs::write(&path, "").unwrap();
        assert!(matches!(
            read_header_names(&path),
            Err(PipelineError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_write_cleaned_is_atomic_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("cleaned.csv");
        let header = Header::resolve(HEADER.split(',')).unwrap();
        let record = CleanRecord {
            name: "Smith, Ann".into(),
            age: "30".into(),
            gender: "Female".into(),
            medical_condition: "Flu".into(),
            date_of_admission: "2024-01-01".into(),
            doctor: "Bo".into(),
            hospital: "H".into(),
            insurance_provider: "P".into(),
            billing_amount: FixedDecimal::from_hundredths(150),
            admission_type: "Urgent".into(),
            discharge_date: "2024-01-02".into(),
            medication: "Aspirin".into(),
            test_results: "Normal".into(),
            pass_through: Vec::new(),
        };

        let info = write_cleaned(&path, &header, &[record]).unwrap();
        assert_eq!(info.rows, 1);
        assert_eq!(info.sha256.len(), 64);
        assert!(!dir.path().join("out").join(".cleaned.csv.tmp").exists());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(HEADER));
        assert!(text.contains("\"Smith, Ann\",30,Female"));
        assert!(text.contains(",1.50,"));
        assert_eq!(read_header_names(&path).unwrap().len(), 13);
        assert_eq!(sha256_file(&path).unwrap(), info.sha256);
    }
}
