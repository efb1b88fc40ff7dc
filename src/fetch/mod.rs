use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use futures_util::StreamExt;
use reqwest::Client;

use crate::config::HttpConfig;
use crate::{ExtractError, Result};

/// Build the shared HTTP client with a realistic user agent and a bounded
/// request timeout.
pub fn build_client(http: &HttpConfig) -> Result<Client> {
    Client::builder()
        .user_agent(http.user_agent.clone())
        .timeout(http.request_timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch a page body as text, mapping non-2xx statuses to an upstream
/// fetch failure.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractError::UpstreamFetchFailed(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(ExtractError::UpstreamFetchFailed(format!(
            "{}: HTTP {}",
            url,
            response.status()
        ))
        .into());
    }

    response
        .text()
        .await
        .map_err(|e| ExtractError::UpstreamFetchFailed(format!("{}: {}", url, e)).into())
}

/// Stream a download to a file on disk.
pub async fn download_to_file(client: &Client, url: &str, path: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractError::UpstreamFetchFailed(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(ExtractError::UpstreamFetchFailed(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        ))
        .into());
    }

    let mut file = fs_err::File::create(path)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            ExtractError::UpstreamFetchFailed(format!("Download interrupted: {}", e))
        })?;
        file.write_all(&chunk)?;
    }

    Ok(())
}

/// Unique temp path under the system temp directory. Uniqueness comes from
/// a randomized suffix, not locking, so concurrent extractions never collide.
pub fn temp_path(prefix: &str, extension: &str) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    std::env::temp_dir().join(format!("unfurl-{}-{}.{}", prefix, &id[..8], extension))
}

/// RAII guard for a single temp file. Dropping the guard removes the file,
/// so cleanup runs on error and cancellation paths as well as success.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self {
            path: temp_path(prefix, extension),
        }
    }

    /// Adopt an existing path (e.g. one the download tool created with its
    /// own extension).
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs_err::remove_file(&self.path) {
                tracing::warn!("Failed to remove temp file {}: {}", self.path.display(), e);
            }
        }
    }
}
