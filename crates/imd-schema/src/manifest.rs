//! Dependency manifest parsing.
//!
//! The manifest lists, per dependency, where its source lives: a release
//! archive URL (OpenSSL) or a git URL plus a pinned commit (everything else).
//! It is read once at startup and never mutated afterwards.
//!
//! Two encodings are accepted. JSON keeps compatibility with the historical
//! `dependencies.json`:
//!
//! ```json
//! { "dependencies": [ { "name": "libplist", "url": "https://...", "commit": "2d8d7ef" } ] }
//! ```
//!
//! Any other extension is read as TOML:
//!
//! ```toml
//! [[dependencies]]
//! name = "libplist"
//! url = "https://..."
//! commit = "2d8d7ef"
//!
//! [dylibs]
//! plist = "libplist-2.0.4.dylib"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Manifest name of the OpenSSL archive dependency.
pub const OPENSSL: &str = "openssl";
/// Manifest name of libplist.
pub const LIBPLIST: &str = "libplist";
/// Manifest name of libimobiledevice-glue.
pub const LIBIMOBILEDEVICE_GLUE: &str = "libimobiledevice-glue";
/// Manifest name of libusbmuxd.
pub const LIBUSBMUXD: &str = "libusbmuxd";

/// One entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Library name, also used as the clone directory and install marker.
    pub name: String,

    /// Archive URL or git remote.
    pub url: String,

    /// Pinned revision for git dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Optional SHA-256 of the archive, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Dependency {
    /// Checks that the mandatory fields are filled in.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::EmptyField`] if `name` or `url` is empty, or
    /// [`ManifestError::InvalidSha256`] if a digest is present but is not 64
    /// hex characters.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                dependency: self.name.clone(),
                field: "name",
            });
        }
        if self.url.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                dependency: self.name.clone(),
                field: "url",
            });
        }
        if let Some(sha) = &self.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ManifestError::InvalidSha256(self.name.clone()));
            }
        }
        Ok(())
    }
}

/// File names of the shared libraries rewritten by macOS relocation.
///
/// The defaults match the library versions pinned by the stock manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DylibNames {
    /// `libssl` dylib file name.
    pub ssl: String,
    /// `libcrypto` dylib file name.
    pub crypto: String,
    /// `libplist` dylib file name.
    pub plist: String,
    /// `libusbmuxd` dylib file name.
    pub usbmuxd: String,
    /// `libimobiledevice` dylib file name (built into `build/lib`).
    pub imobiledevice: String,
}

impl Default for DylibNames {
    fn default() -> Self {
        Self {
            ssl: "libssl.1.1.dylib".to_string(),
            crypto: "libcrypto.1.1.dylib".to_string(),
            plist: "libplist-2.0.3.dylib".to_string(),
            usbmuxd: "libusbmuxd-2.0.6.dylib".to_string(),
            imobiledevice: "libimobiledevice-1.0.6.dylib".to_string(),
        }
    }
}

/// The full dependency manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// All declared dependencies, in file order.
    pub dependencies: Vec<Dependency>,

    /// Relocation library names.
    #[serde(default)]
    pub dylibs: DylibNames,
}

/// Errors produced while reading or querying a [`Manifest`].
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON syntax or schema error.
    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML syntax or schema error.
    #[error("invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),

    /// A dependency the installer needs is not listed.
    #[error("dependency '{0}' is missing from the manifest")]
    MissingDependency(String),

    /// A git dependency has no pinned commit.
    #[error("dependency '{0}' has no pinned commit")]
    MissingCommit(String),

    /// A required field is empty.
    #[error("dependency '{dependency}' has an empty {field}")]
    EmptyField {
        /// Offending dependency name.
        dependency: String,
        /// Field name.
        field: &'static str,
    },

    /// A `sha256` value is not a 64-character hex digest.
    #[error("dependency '{0}' has an invalid sha256 digest")]
    InvalidSha256(String),

    /// Two records share a name.
    #[error("dependency '{0}' is listed more than once")]
    DuplicateDependency(String),
}

impl Manifest {
    /// Read and validate a manifest from disk.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// contains an invalid record.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Parse a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or an invalid record.
    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a TOML manifest.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or an invalid record.
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            dep.validate()?;
            if !seen.insert(dep.name.as_str()) {
                return Err(ManifestError::DuplicateDependency(dep.name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a dependency by name.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::MissingDependency`] if no record has that name.
    pub fn get(&self, name: &str) -> Result<&Dependency, ManifestError> {
        self.dependencies
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ManifestError::MissingDependency(name.to_string()))
    }

    /// Look up a git dependency and return it together with its pinned commit.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::MissingDependency`] if the record is absent, or
    /// [`ManifestError::MissingCommit`] if it has no commit.
    pub fn pinned(&self, name: &str) -> Result<(&Dependency, &str), ManifestError> {
        let dep = self.get(name)?;
        let commit = dep
            .commit
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingCommit(name.to_string()))?;
        Ok((dep, commit))
    }
}
