//! Archive extraction module
//!
//! Handles the source tarball formats OpenSSL is published in.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors produced while unpacking an archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Reading the archive or writing its entries failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file name has no recognised archive extension.
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The archive is malformed or contains an unsafe path.
    #[error("Archive error: {0}")]
    Archive(String),
}

/// Archive container recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.tar`
    Tar,
}

impl ArchiveFormat {
    /// Detect the format from an archive file name.
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    fn extension(self, lower: &str) -> &'static str {
        match self {
            Self::TarGz if lower.ends_with(".tgz") => ".tgz",
            Self::TarGz => ".tar.gz",
            Self::Tar => ".tar",
        }
    }
}

/// Archive file name without its archive extension.
///
/// `openssl-1.1.1k.tar.gz` becomes `openssl-1.1.1k`, which is the directory
/// the release tarball unpacks into.
pub fn archive_stem(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    match ArchiveFormat::detect(file_name) {
        Some(format) => &file_name[..file_name.len() - format.extension(&lower).len()],
        None => file_name,
    }
}

/// Extract `archive_path` into `dest_dir`, choosing the decoder by file name.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractError> {
    let file_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match ArchiveFormat::detect(file_name) {
        Some(ArchiveFormat::TarGz) => extract_tar_gz(archive_path, dest_dir),
        Some(ArchiveFormat::Tar) => {
            let file = File::open(archive_path)?;
            extract_tar(BufReader::new(file), dest_dir)
        }
        None => Err(ExtractError::UnsupportedFormat(file_name.to_string())),
    }
}

/// Async wrapper: extraction is blocking IO, so it runs off the reactor.
pub async fn extract_archive_async(
    archive_path: PathBuf,
    dest_dir: PathBuf,
) -> Result<usize, ExtractError> {
    tokio::task::spawn_blocking(move || extract_archive(&archive_path, &dest_dir))
        .await
        .map_err(|e| ExtractError::Archive(format!("extraction task failed: {e}")))?
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

/// Extract a tar stream, returning the number of entries written.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<usize, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path = entry.path()?.into_owned();

        // Zip Slip
        if relative_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        let absolute_path = dest_dir.join(&relative_path);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // pax global headers carry no file content
        if entry.header().entry_type() == tar::EntryType::XGlobalHeader {
            continue;
        }

        entry.unpack(&absolute_path)?;
        count += 1;
    }

    Ok(count)
}
