//! HTTP client for artifact upload and download.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use super::{archive, ArtifactError};

/// Client for one build's artifact namespace on the server.
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    http: reqwest::Client,
    url: String,
}

impl ArtifactClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Upload a file or directory rooted at `dest_prefix` in the build's
    /// artifact tree.
    ///
    /// The request carries two multipart parts: `zipfile` with the packaged
    /// archive and `file_checksum` with one `path=md5hex` line per file. The
    /// server appends the checksum lines to the build's checksum file.
    pub async fn upload(&self, source: &Path, dest_prefix: &str) -> Result<(), ArtifactError> {
        let (bytes, entries) = archive::package(source, dest_prefix)?;
        let checksums: String = entries.iter().map(|e| e.checksum_line()).collect();
        debug!("uploading {} artifact entries from {:?}", entries.len(), source);

        let form = Form::new()
            .part(
                "zipfile",
                Part::bytes(bytes)
                    .file_name("artifacts.zip")
                    .mime_str("application/zip")?,
            )
            .part("file_checksum", Part::text(checksums));

        let response = self.http.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArtifactError::Rejected(body));
        }

        info!("uploaded artifacts from {:?}", source);
        Ok(())
    }

    /// Download one artifact file to `destination`.
    pub async fn download(&self, source: &str, destination: &Path) -> Result<(), ArtifactError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("file", source)])
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArtifactError::Rejected(body));
        }

        let bytes = response.bytes().await?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;

        info!("downloaded artifact '{source}' to {destination:?}");
        Ok(())
    }
}
