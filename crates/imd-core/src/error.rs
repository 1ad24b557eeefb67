//! Error types for the installer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use imd_schema::ManifestError;

use crate::io::download::DownloadError;
use crate::io::extract::ExtractError;
use crate::relinker::RelocationError;
use crate::step::StepError;

/// Failure obtaining a release archive.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The archive could not be downloaded or failed its hash check.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// The downloaded archive could not be unpacked.
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Any error that aborts an installer run.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The dependency manifest is missing a record or a pin.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// An external build step failed.
    #[error(transparent)]
    Step(#[from] StepError),

    /// Fetching a release archive failed.
    #[error("{name}: {source}")]
    Fetch {
        /// Dependency being fetched.
        name: String,
        /// Underlying failure.
        #[source]
        source: FetchError,
    },

    /// A filesystem operation failed.
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// What was being done, e.g. `removing`.
        action: &'static str,
        /// Path being operated on.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A copy pattern could not be compiled.
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Something the final build needs is absent.
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// The dylib relocation plan is invalid.
    #[error(transparent)]
    Relocation(#[from] RelocationError),
}

impl InstallError {
    /// Wrap a filesystem error with what was being done to which path.
    pub fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    /// Wrap a fetch failure for dependency `name`.
    pub fn fetch(name: &str, source: impl Into<FetchError>) -> Self {
        Self::Fetch {
            name: name.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message() {
        let err = InstallError::io("removing", "/work/tmp")(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "removing /work/tmp: denied");
    }

    #[test]
    fn test_fetch_error_message() {
        let err = InstallError::fetch(
            "openssl",
            ExtractError::UnsupportedFormat("openssl.zip".into()),
        );
        assert_eq!(
            err.to_string(),
            "openssl: extraction failed: Unsupported archive format: openssl.zip"
        );
    }

    #[test]
    fn test_missing_prerequisite_message() {
        let err = InstallError::MissingPrerequisite("OpenSSL not found".into());
        assert_eq!(err.to_string(), "missing prerequisite: OpenSSL not found");
    }
}
