//! Eye-tracker export ingestion
//!
//! Exports are either tab-separated text (`.gazedata`) with one header row,
//! or a spreadsheet whose first worksheet has the same layout. Only the
//! columns in [`REQUIRED_COLUMNS`] are read; anything else is ignored.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use csv::StringRecord;

use crate::error::{PupilError, Result};
use crate::mmap_utils::mmap_file;
use crate::types::{RawSample, RawSession};

pub const REQUIRED_COLUMNS: [&str; 8] = [
    "TETTime",
    "Subject",
    "Session",
    "DiameterPupilLeftEye",
    "DiameterPupilRightEye",
    "ValidityLeftEye",
    "ValidityRightEye",
    "CurrentObject",
];

/// Extensions read as tab-separated text
pub const TEXT_EXTENSIONS: [&str; 4] = ["gazedata", "tsv", "txt", "csv"];

/// Extensions read as spreadsheets (first worksheet only)
pub const SPREADSHEET_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "ods"];

/// Validity codes at or above this mean the eye was not found
pub const BLINK_VALIDITY: i32 = 2;

const DEFAULT_SESSION: &str = "1";

struct Columns {
    time: usize,
    subject: usize,
    session: usize,
    left: usize,
    right: usize,
    left_validity: usize,
    right_validity: usize,
    object: usize,
}

fn missing_from(headers: &StringRecord) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h.trim() == *c))
        .collect()
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let missing = missing_from(headers);
        if !missing.is_empty() {
            return Err(PupilError::Ingestion(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        // every name is present at this point
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .unwrap_or_default()
        };

        Ok(Self {
            time: find("TETTime"),
            subject: find("Subject"),
            session: find("Session"),
            left: find("DiameterPupilLeftEye"),
            right: find("DiameterPupilRightEye"),
            left_validity: find("ValidityLeftEye"),
            right_validity: find("ValidityRightEye"),
            object: find("CurrentObject"),
        })
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn is_spreadsheet(path: &Path) -> bool {
    SPREADSHEET_EXTENSIONS.contains(&extension(path).as_str())
}

/// Check that `path` names an existing file of a readable type.
pub fn check_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PupilError::FileNotFound(path.display().to_string()));
    }

    let ext = extension(path);
    if !TEXT_EXTENSIONS.contains(&ext.as_str()) && !SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        let expected: Vec<&str> = TEXT_EXTENSIONS
            .iter()
            .chain(SPREADSHEET_EXTENSIONS.iter())
            .copied()
            .collect();
        return Err(PupilError::UnsupportedFileType(format!(
            "'{}' (expected one of: {})",
            path.display(),
            expected.join(", ")
        )));
    }

    Ok(())
}

/// Read the header row only and report which required columns are missing.
pub fn missing_columns(path: &Path) -> Result<Vec<&'static str>> {
    check_file(path)?;
    if is_spreadsheet(path) {
        let (headers, _) = spreadsheet_rows(path)?;
        return Ok(missing_from(&headers));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(|e| PupilError::Ingestion(e.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|e| PupilError::Ingestion(e.to_string()))?;

    Ok(missing_from(headers))
}

/// Load a session from disk. The file stem stands in for a blank subject.
pub fn read_session(path: &Path) -> Result<RawSession> {
    check_file(path)?;

    if std::fs::metadata(path)?.len() == 0 {
        return Err(PupilError::Ingestion(format!(
            "'{}' is empty",
            path.display()
        )));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    if is_spreadsheet(path) {
        let (headers, rows) = spreadsheet_rows(path)?;
        log::debug!("Read {} ({} spreadsheet rows)", path.display(), rows.len());
        return parse_records(&headers, rows.into_iter().map(Ok), stem);
    }

    let mmap = mmap_file(path)?;
    log::debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
    parse_gazedata(&mmap, stem)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Header and data rows of the first worksheet, as text cells
fn spreadsheet_rows(path: &Path) -> Result<(StringRecord, Vec<StringRecord>)> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PupilError::Ingestion(format!("cannot open '{}': {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PupilError::Ingestion(format!("'{}' has no worksheets", path.display())))?
        .map_err(|e| PupilError::Ingestion(format!("cannot read '{}': {}", path.display(), e)))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<StringRecord>());
    let headers = rows
        .next()
        .ok_or_else(|| PupilError::Ingestion(format!("'{}' has no header row", path.display())))?;
    Ok((headers, rows.collect()))
}

fn parse_number(field: &str, column: &str, row: usize) -> Result<f64> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|_| {
        PupilError::Ingestion(format!(
            "row {}: cannot read '{}' in column {}",
            row, field, column
        ))
    })
}

fn parse_validity(field: &str, column: &str, row: usize) -> Result<bool> {
    let value = parse_number(field, column, row)?;
    // A missing code counts as not found
    Ok(value.is_nan() || value >= f64::from(BLINK_VALIDITY))
}

/// Parse tab-separated gaze data.
///
/// Timestamps are made relative to the first row and converted from
/// milliseconds to microseconds. Blank `CurrentObject` cells become `None`.
pub fn parse_gazedata(content: &[u8], fallback_subject: &str) -> Result<RawSession> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| PupilError::Ingestion(format!("cannot read header: {}", e)))?
        .clone();
    parse_records(&headers, reader.records(), fallback_subject)
}

fn parse_records<I>(headers: &StringRecord, records: I, fallback_subject: &str) -> Result<RawSession>
where
    I: IntoIterator<Item = std::result::Result<StringRecord, csv::Error>>,
{
    let cols = Columns::locate(headers)?;

    let mut subject: Option<String> = None;
    let mut session: Option<String> = None;
    let mut origin: Option<f64> = None;
    let mut samples = Vec::new();

    for (i, record) in records.into_iter().enumerate() {
        // header is line 1
        let row = i + 2;
        let record = record.map_err(|e| PupilError::Ingestion(format!("row {}: {}", row, e)))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        if field(cols.time).trim().is_empty() {
            continue;
        }
        let time_ms = parse_number(field(cols.time), "TETTime", row)?;
        let origin_ms = *origin.get_or_insert(time_ms);

        if subject.is_none() && !field(cols.subject).trim().is_empty() {
            subject = Some(field(cols.subject).trim().to_string());
        }
        if session.is_none() && !field(cols.session).trim().is_empty() {
            session = Some(field(cols.session).trim().to_string());
        }

        let object = field(cols.object).trim();
        samples.push(RawSample {
            timestamp_us: ((time_ms - origin_ms) * 1000.0).round() as i64,
            left_diameter: parse_number(field(cols.left), "DiameterPupilLeftEye", row)?,
            right_diameter: parse_number(field(cols.right), "DiameterPupilRightEye", row)?,
            left_blink: parse_validity(field(cols.left_validity), "ValidityLeftEye", row)?,
            right_blink: parse_validity(field(cols.right_validity), "ValidityRightEye", row)?,
            current_object: (!object.is_empty()).then(|| object.to_string()),
        });
    }

    if samples.is_empty() {
        return Err(PupilError::Ingestion("no data rows".to_string()));
    }

    let subject = subject.unwrap_or_else(|| fallback_subject.to_string());
    let session = session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
    log::debug!(
        "Parsed {} samples for subject {} session {}",
        samples.len(),
        subject,
        session
    );

    RawSession::new(subject, session, samples)
}
