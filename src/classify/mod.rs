//! Content-based format classification
//!
//! The canonical extension of a file is decided from its leading bytes, not
//! its name: first the [`signatures`] table, then the `image` crate's format
//! guesser, and only then the path's own extension when that extension is on
//! the allow-list. The same file always yields the same answer.

pub mod signatures;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Bytes read from the start of each file
pub const HEADER_LEN: usize = 4096;

/// Which stage produced a classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifiedBy {
    /// Byte-signature table
    Signature,
    /// `image` crate format guesser
    ImageLibrary,
    /// Allow-listed path extension
    PathExtension,
}

/// Canonical extension of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Lowercase extension without the dot
    pub extension: String,
    /// How it was decided
    pub by: ClassifiedBy,
}

/// Classifies local files by content
#[derive(Clone, Debug)]
pub struct FormatClassifier {
    path_fallback: Vec<String>,
}

impl FormatClassifier {
    /// `path_fallback` lists extensions trusted when the content is not recognized
    pub fn new(path_fallback: Vec<String>) -> Self {
        Self {
            path_fallback: path_fallback
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classify a file on disk; `Ok(None)` means the format is unknown
    pub async fn classify(&self, path: &Path) -> Result<Option<Classification>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_size = file.metadata().await?.len();

        let mut header = Vec::with_capacity(HEADER_LEN);
        file.take(HEADER_LEN as u64).read_to_end(&mut header).await?;

        let classification = self.classify_header(&header, file_size, path);
        match &classification {
            Some(found) => tracing::debug!(
                path = %path.display(),
                extension = %found.extension,
                by = ?found.by,
                "Classified file"
            ),
            None => tracing::debug!(path = %path.display(), "File format not recognized"),
        }
        Ok(classification)
    }

    /// Classify already-read leading bytes
    pub fn classify_header(
        &self,
        header: &[u8],
        file_size: u64,
        path: &Path,
    ) -> Option<Classification> {
        if let Some((signature, extension)) = signatures::identify(header, file_size) {
            tracing::trace!(signature = signature.label, extension, "Signature matched");
            return Some(Classification {
                extension: extension.to_string(),
                by: ClassifiedBy::Signature,
            });
        }

        if let Ok(format) = image::guess_format(header)
            && let Some(extension) = format.extensions_str().first()
        {
            return Some(Classification {
                extension: extension.to_string(),
                by: ClassifiedBy::ImageLibrary,
            });
        }

        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.path_fallback
            .contains(&extension)
            .then_some(Classification {
                extension,
                by: ClassifiedBy::PathExtension,
            })
    }
}
