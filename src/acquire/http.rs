//! Streamed HTTP downloads

use crate::control::RunControl;
use crate::error::{DownloadError, Error, Result};
use crate::utils::file_name_from_response;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Stream `url` into a new file under `dir`
///
/// Each call writes to its own `<attempt>-<name>` file; a partial or empty
/// file is removed before the error is returned.
pub(crate) async fn fetch_to_dir(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    attempt: u32,
    control: &RunControl,
) -> Result<PathBuf> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    let name = file_name_from_response(&response, url);
    let path = dir.join(format!("{}-{}", attempt, name));

    match stream_body(response, &path, control).await {
        Ok(0) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(DownloadError::Empty {
                url: url.to_string(),
            }
            .into())
        }
        Ok(bytes) => {
            tracing::debug!(url, bytes, path = %path.display(), "Download complete");
            Ok(path)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

async fn stream_body(response: reqwest::Response, path: &Path, control: &RunControl) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        let chunk = tokio::select! {
            _ = control.token().cancelled() => return Err(Error::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
