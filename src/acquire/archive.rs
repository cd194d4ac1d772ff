//! Web archive index used when a direct download is exhausted

use crate::error::Result;
use async_trait::async_trait;

/// Historical copies of URLs
#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// Timestamp of the earliest successful capture of `url`, if any
    async fn find_earliest_snapshot(&self, url: &str) -> Result<Option<String>>;

    /// Raw-content URL of the capture taken at `timestamp`
    fn snapshot_url(&self, url: &str, timestamp: &str) -> String;
}

/// Wayback Machine CDX index
pub struct WaybackArchive {
    client: reqwest::Client,
    base_url: String,
}

impl WaybackArchive {
    /// Query `base_url` (e.g. `https://web.archive.org`) with `client`
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArchiveIndex for WaybackArchive {
    async fn find_earliest_snapshot(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/cdx/search/cdx", self.base_url))
            .query(&[
                ("url", url),
                ("output", "json"),
                ("limit", "1"),
                ("fl", "timestamp"),
                ("filter", "statuscode:200"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        // First row is the field-name header
        let rows: Vec<Vec<String>> = serde_json::from_str(&text)?;
        Ok(rows
            .into_iter()
            .nth(1)
            .and_then(|row| row.into_iter().next())
            .filter(|ts| !ts.is_empty()))
    }

    fn snapshot_url(&self, url: &str, timestamp: &str) -> String {
        // `id_` asks for the original bytes without the archive's toolbar
        format!("{}/web/{}id_/{}", self.base_url, timestamp, url)
    }
}
