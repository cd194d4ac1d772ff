//! File and table fixtures

use std::path::{Path, PathBuf};

/// 1x1 PNG header
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// GIF89a header
pub const GIF: &[u8] = b"GIF89a\x01\0\x01\0\x80\0\0\0\0\0\xff\xff\xff!\xf9\x04\x01\0\0\0\0,";

/// Plain text, which no signature matches
pub const TEXT: &[u8] = b"just some notes, not media";

/// Write `bytes` to `dir/name`
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// Write a CSV with the standard header and the given rows
pub fn write_csv(dir: &Path, name: &str, rows: &[[&str; 3]]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = csv::Writer::from_path(&path).expect("create csv");
    writer
        .write_record(["file_path", "target_filename", "description"])
        .expect("write header");
    for row in rows {
        writer.write_record(row).expect("write row");
    }
    writer.flush().expect("flush csv");
    path
}

/// Write a JSON array of row objects
pub fn write_json(dir: &Path, name: &str, rows: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(&rows).expect("encode json"))
        .expect("write json");
    path
}

/// Read back a delimited results file, header included
pub fn read_records(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .expect("open results");
    reader
        .records()
        .map(|record| {
            record
                .expect("parse results")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect()
}
