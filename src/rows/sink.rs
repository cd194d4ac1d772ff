//! Result output and the incremental success journal

use super::{FIELD_NAMES, Record, STATUS_COLUMN, Table, TableFormat, VERIFICATION_COLUMN};
use crate::error::{Error, Result};
use crate::types::TaskResult;
use crate::utils::unique_path;
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Write `table` back with status columns to `output` (or a free ` (n)` variant)
///
/// Records without a result (dropped rows) get empty status cells.
/// Returns the path actually written.
pub fn write_results(table: &Table, results: &[TaskResult], output: &Path) -> Result<PathBuf> {
    let path = unique_path(output)?;
    let by_row: HashMap<usize, &TaskResult> = results.iter().map(|r| (r.row, r)).collect();
    let cells = |index: usize| -> (String, String) {
        by_row
            .get(&(index + 1))
            .map(|r| {
                (
                    r.status_text(),
                    r.verification.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                )
            })
            .unwrap_or_default()
    };

    match table.format {
        TableFormat::Json => write_json(table, &cells, &path)?,
        TableFormat::Spreadsheet => write_workbook(table, &cells, &path)?,
        format => write_delimited(table, &cells, format.delimiter(), &path)?,
    }

    tracing::info!(path = %path.display(), results = results.len(), "Results written");
    Ok(path)
}

/// Header (when present) and records as cell lines, each padded to the widest
/// record and followed by the two status cells
fn result_lines(table: &Table, cells: &dyn Fn(usize) -> (String, String)) -> Vec<Vec<String>> {
    let width = table
        .records
        .iter()
        .map(|record| match record {
            Record::Fields(fields) => fields.len(),
            Record::Object(_) => FIELD_NAMES.len(),
        })
        .chain(table.header.iter().map(Vec::len))
        .fold(FIELD_NAMES.len(), usize::max);

    let header = table.header.iter().map(|header| {
        let mut line = padded(header.clone(), width);
        line.push(STATUS_COLUMN.to_string());
        line.push(VERIFICATION_COLUMN.to_string());
        line
    });

    let records = table.records.iter().enumerate().map(|(index, record)| {
        let fields = match record {
            Record::Fields(fields) => fields.clone(),
            Record::Object(_) => (0..FIELD_NAMES.len()).map(|i| record.field(i)).collect(),
        };
        let (status, verification) = cells(index);
        let mut line = padded(fields, width);
        line.push(status);
        line.push(verification);
        line
    });

    header.chain(records).collect()
}

fn write_delimited(
    table: &Table,
    cells: &dyn Fn(usize) -> (String, String),
    delimiter: u8,
    path: &Path,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    for line in result_lines(table, cells) {
        writer.write_record(&line)?;
    }

    writer.flush()?;
    Ok(())
}

/// Single-sheet xlsx; empty cells are left blank
fn write_workbook(
    table: &Table,
    cells: &dyn Fn(usize) -> (String, String),
    path: &Path,
) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (row, line) in result_lines(table, cells).iter().enumerate() {
        let row = u32::try_from(row)
            .map_err(|_| Error::InvalidInput("too many rows for a worksheet".to_string()))?;
        for (col, text) in line.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let col = u16::try_from(col)
                .map_err(|_| Error::InvalidInput("too many columns for a worksheet".to_string()))?;
            sheet.write_string(row, col, text)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn padded(mut fields: Vec<String>, width: usize) -> Vec<String> {
    fields.resize(width.max(fields.len()), String::new());
    fields
}

fn write_json(table: &Table, cells: &dyn Fn(usize) -> (String, String), path: &Path) -> Result<()> {
    let items: Vec<Value> = table
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let mut object = match record {
                Record::Object(map) => map.clone(),
                Record::Fields(_) => FIELD_NAMES
                    .iter()
                    .enumerate()
                    .map(|(i, key)| (key.to_string(), Value::String(record.field(i))))
                    .collect::<Map<_, _>>(),
            };
            let (status, verification) = cells(index);
            object.insert(STATUS_COLUMN.to_string(), Value::String(status));
            object.insert(VERIFICATION_COLUMN.to_string(), Value::String(verification));
            Value::Object(object)
        })
        .collect();

    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &items)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Append-only JSON-lines record of successful uploads
///
/// Each success is written as soon as the repository accepts it, so a crash
/// mid-run still leaves a record of what was published.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl Journal {
    /// Journal location for a result file: `<output>.journal.jsonl`
    pub fn path_for(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_os_string();
        name.push(".journal.jsonl");
        PathBuf::from(name)
    }

    /// Open `path` for appending, creating it if needed
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Where the journal lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one result as a JSON line
    pub async fn append(&self, result: &TaskResult) -> Result<()> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Every result journaled so far
    pub async fn read_all(&self) -> Result<Vec<TaskResult>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    /// Delete the journal file; a missing file is not an error
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
