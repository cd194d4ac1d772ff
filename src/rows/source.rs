//! Reading input tables
//!
//! CSV and TSV are read without headers; a first record naming the
//! `file_path` and `target_filename` columns is recognised and kept apart.
//! Workbooks are read from their first sheet. JSON must be an array of
//! objects (or of 3-element arrays). All readers are blocking; the run calls
//! them from `spawn_blocking`.

use super::{FIELD_NAMES, Record, Table, TableFormat, value_text};
use crate::error::{Error, Result};
use calamine::{Data, Reader, open_workbook_auto};
use serde_json::Value;
use std::path::Path;

/// Read `path` in the format its extension names
///
/// # Errors
///
/// Missing files give [`Error::NotFound`]; parse failures give the reader's error.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let format = TableFormat::from_path(path)?;
    let mut records = match format {
        TableFormat::Csv | TableFormat::Tsv => read_delimited(path, format.delimiter())?,
        TableFormat::Spreadsheet => read_workbook(path)?,
        TableFormat::Json => read_json(path)?,
    };

    let header = match records.first() {
        Some(Record::Fields(fields)) if is_header(fields) => match records.remove(0) {
            Record::Fields(fields) => Some(fields),
            Record::Object(_) => None,
        },
        _ => None,
    };

    tracing::debug!(
        path = %path.display(),
        ?format,
        records = records.len(),
        header = header.is_some(),
        "Read input table"
    );

    Ok(Table {
        format,
        header,
        records,
    })
}

fn is_header(fields: &[String]) -> bool {
    fields.len() >= 2
        && fields
            .iter()
            .zip(FIELD_NAMES.iter())
            .take(2)
            .all(|(cell, name)| cell.trim().eq_ignore_ascii_case(name))
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(Record::Fields(record.iter().map(str::to_string).collect()));
    }
    Ok(records)
}

fn read_workbook(path: &Path) -> Result<Vec<Record>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::InvalidInput(format!("{} has no worksheets", path.display())))??;

    // The range starts at the first used cell; keep column A as field 0
    let leading = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|cells| {
            let mut fields = vec![String::new(); leading];
            fields.extend(cells.iter().map(cell_text));
            Record::Fields(fields)
        })
        .collect())
}

/// Cell text; integral floats lose their `.0`
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn read_json(path: &Path) -> Result<Vec<Record>> {
    let bytes = std::fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)?;

    let Value::Array(items) = value else {
        return Err(Error::InvalidInput(format!(
            "{} must contain a JSON array",
            path.display()
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(Record::Object(map)),
            Value::Array(cells) => Ok(Record::Fields(cells.iter().map(value_text).collect())),
            Value::Null => Ok(Record::Fields(Vec::new())),
            other => Err(Error::InvalidInput(format!(
                "row {}: expected an object, found {}",
                i + 1,
                other
            ))),
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_csv_with_header() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "rows.csv",
            "file_path,target_filename,description\n\
             /tmp/a.png,Sunset,\"A sunset, at sea\"\n\
             https://example.org/b.jpg,Dawn\n",
        );

        let table = read_table(&path).unwrap();
        assert_eq!(table.format, TableFormat::Csv);
        assert_eq!(table.header.as_ref().unwrap()[1], "target_filename");

        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].description, "A sunset, at sea");
        assert_eq!(rows[1].source, "https://example.org/b.jpg");
        assert_eq!(rows[1].description, "");
    }

    #[test]
    fn test_tsv_without_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rows.tsv", "a.png\tA\tfirst\nb.png\tB\tsecond\n");

        let table = read_table(&path).unwrap();
        assert!(table.header.is_none());
        let rows = table.rows();
        assert_eq!(rows[1].target, "B");
        assert_eq!(rows[1].description, "second");
    }

    #[test]
    fn test_json_objects_and_arrays() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "rows.json",
            r#"[
                {"file_path": "a.png", "target_filename": "A", "description": null},
                ["b.png", "B", "desc"],
                {"file_path": "c.png"}
            ]"#,
        );

        let (valid, dropped) = read_table(&path).unwrap().valid_rows();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].description, "");
        assert_eq!(valid[1].description, "desc");
        assert_eq!(dropped, vec![3]);
    }

    #[test]
    fn test_json_must_be_array() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rows.json", r#"{"file_path": "a.png"}"#);
        assert!(matches!(read_table(&path), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().unwrap();
        let err = read_table(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(12.0)), "12");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("x".into())), "x");
    }
}
