//! Post-publish comparison of the stored file against the source

use crate::repository::Repository;
use crate::types::Verification;
use std::path::Path;

/// Allowed difference between local and remote size, in bytes
pub const SIZE_TOLERANCE: u64 = 2;

/// Compares what the repository stored with what was sent
pub struct Verifier {
    category_marker: String,
}

impl Verifier {
    /// `category_marker` is ignored when comparing description text
    pub fn new(category_marker: impl Into<String>) -> Self {
        Self {
            category_marker: category_marker.into(),
        }
    }

    /// Check size and text of `name`; never fails, mismatches are reported as `NotOk`
    pub async fn verify(
        &self,
        repository: &dyn Repository,
        name: &str,
        local: &Path,
        description: &str,
    ) -> Verification {
        let remote = match repository.fetch_metadata(name).await {
            Ok(remote) => remote,
            Err(e) => return Verification::NotOk(format!("metadata lookup failed: {}", e)),
        };

        let local_size = match tokio::fs::metadata(local).await {
            Ok(meta) => meta.len(),
            Err(e) => return Verification::NotOk(format!("cannot read local file: {}", e)),
        };

        if local_size.abs_diff(remote.size) > SIZE_TOLERANCE {
            return Verification::NotOk(format!(
                "size mismatch (local {} bytes, remote {} bytes)",
                local_size, remote.size
            ));
        }

        if self.normalize(&remote.text) != self.normalize(description) {
            return Verification::NotOk("description mismatch".to_string());
        }

        tracing::debug!(name, size = remote.size, "Verified");
        Verification::Verified
    }

    fn normalize(&self, text: &str) -> String {
        let marker = self.category_marker.trim();
        if marker.is_empty() {
            text.trim().to_string()
        } else {
            text.replace(marker, "").trim().to_string()
        }
    }
}
