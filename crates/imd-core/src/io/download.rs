//! Streaming archive download with optional SHA-256 verification.

use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Reporter;

/// Errors produced while downloading an archive.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport or HTTP status error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The body did not match the pinned digest.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Digest from the manifest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },
}

/// Build the HTTP client used for archive downloads.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client() -> Result<Client, DownloadError> {
    Ok(Client::builder().user_agent(crate::USER_AGENT).build()?)
}

/// Download `url` to `dest`, returning the hex SHA-256 of the body.
///
/// When `expected_hash` is given the digest must match (case-insensitive);
/// on mismatch the partial file is removed.
///
/// # Errors
///
/// Returns an error on HTTP failure (including non-2xx status), IO failure,
/// or digest mismatch.
pub async fn download_file<R: Reporter + ?Sized>(
    client: &Client,
    name: &str,
    url: &str,
    dest: &Path,
    expected_hash: Option<&str>,
    reporter: &R,
) -> Result<String, DownloadError> {
    debug!(url, dest = %dest.display(), "downloading");

    let response = client.get(url).send().await?.error_for_status()?;
    let total_size = response.content_length();
    reporter.downloading(name, 0, total_size);

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        reporter.downloading(name, downloaded, total_size);
    }

    file.flush().await?;
    let actual_hash = hex::encode(hasher.finalize());

    if let Some(expected) = expected_hash {
        if !actual_hash.eq_ignore_ascii_case(expected) {
            tokio::fs::remove_file(dest).await.ok();
            return Err(DownloadError::HashMismatch {
                expected: expected.to_string(),
                actual: actual_hash,
            });
        }
    }

    Ok(actual_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;

    const BODY: &[u8] = b"not really a tarball";

    fn body_hash() -> String {
        hex::encode(Sha256::digest(BODY))
    }

    #[tokio::test]
    async fn test_download_writes_file_and_hashes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/source/openssl-1.1.1k.tar.gz")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("openssl-1.1.1k.tar.gz");
        let url = format!("{}/source/openssl-1.1.1k.tar.gz", server.url());

        let client = http_client().unwrap();
        let hash = download_file(&client, "openssl", &url, &dest, None, &NullReporter)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(hash, body_hash());
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_download_verifies_pinned_hash() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/openssl.tar.gz")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("openssl.tar.gz");
        let url = format!("{}/openssl.tar.gz", server.url());
        let client = http_client().unwrap();

        let upper = body_hash().to_uppercase();
        download_file(&client, "openssl", &url, &dest, Some(&upper), &NullReporter)
            .await
            .unwrap();

        let wrong = "0".repeat(64);
        let err = download_file(&client, "openssl", &url, &dest, Some(&wrong), &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HashMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let url = format!("{}/missing.tar.gz", server.url());
        let client = http_client().unwrap();
        let err = download_file(
            &client,
            "openssl",
            &url,
            &tmp.path().join("missing.tar.gz"),
            None,
            &NullReporter,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Http(_)));
    }
}
