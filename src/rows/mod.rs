//! Input tables and result output
//!
//! A [`Table`] keeps every input record as read (including a header row, when
//! present) so the result sink can write the same rows back with two status
//! columns appended.

pub mod sink;
pub mod source;

pub use sink::{Journal, write_results};
pub use source::read_table;

use crate::error::{Error, Result};
use crate::types::Row;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Column names used for header detection and JSON objects
pub const FIELD_NAMES: [&str; 3] = ["file_path", "target_filename", "description"];

/// Column appended with the row outcome
pub const STATUS_COLUMN: &str = "Upload_Status";

/// Column appended with the verification outcome
pub const VERIFICATION_COLUMN: &str = "Verification";

/// File family of an input or output table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated
    Csv,
    /// Tab-separated
    Tsv,
    /// First sheet of an xlsx/xls/ods workbook
    Spreadsheet,
    /// Array of objects
    Json,
}

impl TableFormat {
    /// Format from the file extension
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for anything that is not a known table type.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "tsv" | "tab" => Ok(TableFormat::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(TableFormat::Spreadsheet),
            "json" => Ok(TableFormat::Json),
            _ => Err(Error::InvalidInput(format!(
                "unsupported input file type: {}",
                path.display()
            ))),
        }
    }

    /// Field delimiter for the delimited formats
    pub fn delimiter(self) -> u8 {
        match self {
            TableFormat::Tsv => b'\t',
            _ => b',',
        }
    }
}

/// One input record, kept verbatim
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// Positional cells (CSV, TSV, spreadsheet, JSON arrays)
    Fields(Vec<String>),
    /// Named fields (JSON objects)
    Object(Map<String, Value>),
}

impl Record {
    /// Text of the `i`-th of the three known fields; missing and null give ""
    pub fn field(&self, i: usize) -> String {
        match self {
            Record::Fields(fields) => fields.get(i).cloned().unwrap_or_default(),
            Record::Object(map) => FIELD_NAMES
                .get(i)
                .and_then(|key| map.get(*key))
                .map(value_text)
                .unwrap_or_default(),
        }
    }
}

/// Cell text of a JSON value
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Everything read from an input file
#[derive(Clone, Debug)]
pub struct Table {
    /// Format the table was read in
    pub format: TableFormat,
    /// Header row, when the first record named the columns
    pub header: Option<Vec<String>>,
    /// Data records in input order
    pub records: Vec<Record>,
}

impl Table {
    /// All records as rows, valid or not
    pub fn rows(&self) -> Vec<Row> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| Row {
                index,
                source: record.field(0),
                target: record.field(1),
                description: record.field(2),
            })
            .collect()
    }

    /// Rows that have both a source and a target, plus the 1-based numbers of those dropped
    pub fn valid_rows(&self) -> (Vec<Row>, Vec<usize>) {
        let (valid, dropped): (Vec<Row>, Vec<Row>) =
            self.rows().into_iter().partition(Row::is_valid);
        (valid, dropped.iter().map(Row::number).collect())
    }
}

/// `<stem>_results.<ext>` next to `input`; every workbook gets an `.xlsx` result
pub fn default_output_path(input: &Path) -> Result<PathBuf> {
    let format = TableFormat::from_path(input)?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("no file name in {}", input.display())))?;

    let ext = match format {
        TableFormat::Spreadsheet => "xlsx".to_string(),
        _ => input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("csv")
            .to_string(),
    };

    Ok(input.with_file_name(format!("{}_results.{}", stem, ext)))
}
