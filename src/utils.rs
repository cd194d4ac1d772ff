//! Utility functions for file naming and path manipulation

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of ` (n)` suffixes tried when resolving a collision
pub const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Name with a ` (n)` counter inserted before the extension
///
/// # Examples
///
/// ```
/// use batch_uploader::utils::numbered_name;
///
/// assert_eq!(numbered_name("Foo", 1, Some("png")), "Foo (1).png");
/// assert_eq!(numbered_name("notes", 3, None), "notes (3)");
/// ```
#[must_use]
pub fn numbered_name(stem: &str, n: u32, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }
}

/// First path that does not exist on disk: `path` itself, then `stem (1).ext`, `stem (2).ext`, ...
///
/// # Examples
///
/// ```no_run
/// use batch_uploader::utils::unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/rows_results.csv");
/// let unique = unique_path(path).unwrap();
/// // If /tmp/rows_results.csv exists, returns /tmp/rows_results (1).csv
/// ```
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("cannot extract file stem from {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = parent.join(numbered_name(stem, i, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::Other(format!(
        "could not find a free name for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}

/// Local file name for a download, from Content-Disposition or the URL path
///
/// The extension is kept (the classifier may fall back to it); path
/// separators and other unsafe characters are replaced.
pub fn file_name_from_response(response: &reqwest::Response, url: &str) -> String {
    if let Some(content_disposition) = response.headers().get(reqwest::header::CONTENT_DISPOSITION)
        && let Ok(value) = content_disposition.to_str()
    {
        for part in value.split(';') {
            let part = part.trim();
            if let Some(name) = part.strip_prefix("filename=") {
                let name = safe_local_name(name.trim_matches('"'));
                if !name.is_empty() {
                    return name;
                }
            }
        }
    }

    file_name_from_url(url)
}

/// Last path segment of a URL, or `download` when there is none
pub fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
    {
        let name = safe_local_name(last_segment);
        if !name.is_empty() {
            return name;
        }
    }

    "download".to_string()
}

fn safe_local_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string()
}
