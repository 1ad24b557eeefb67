//! Run configuration, constructed once at startup.
//!
//! Everything a step needs (paths, platform, pinned sources, host tools) is
//! resolved here and passed down explicitly.

use std::path::{Path, PathBuf};

use imd_schema::{
    DylibNames, LIBIMOBILEDEVICE_GLUE, LIBPLIST, LIBUSBMUXD, Manifest, ManifestError, OPENSSL,
    Platform,
};

use crate::layout::Layout;

/// A dependency fetched as a release archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    /// Manifest name.
    pub name: String,
    /// Archive URL.
    pub url: String,
    /// Expected SHA-256, when the manifest pins one.
    pub sha256: Option<String>,
}

/// A dependency cloned from git at a pinned commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    /// Manifest name; also the clone directory and install marker prefix.
    pub name: String,
    /// Git remote.
    pub url: String,
    /// Revision to check out.
    pub commit: String,
    /// Whether the build needs `PKG_CONFIG_PATH` pointed at the prefix.
    pub pkg_config: bool,
}

/// Facts about the host gathered before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTools {
    /// System-wide `openssl` executable, if one is on `PATH`.
    pub openssl: Option<PathBuf>,
    /// Root of the MSYS2 MinGW toolchain (`/mingw64`).
    pub mingw_root: PathBuf,
}

impl Default for HostTools {
    fn default() -> Self {
        Self {
            openssl: None,
            mingw_root: PathBuf::from("/mingw64"),
        }
    }
}

impl HostTools {
    /// Look up the tools available on the running host.
    pub fn detect() -> Self {
        Self {
            openssl: which::which("openssl").ok(),
            ..Self::default()
        }
    }

    /// Whether an ambient OpenSSL installation can be used.
    pub fn has_system_openssl(&self) -> bool {
        self.openssl.is_some()
    }

    /// `<mingw_root>/lib/pkgconfig`
    pub fn mingw_pkg_config_dir(&self) -> PathBuf {
        self.mingw_root.join("lib").join("pkgconfig")
    }
}

/// Immutable configuration for one installer run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem layout.
    pub layout: Layout,
    /// Resolved host platform.
    pub platform: Platform,
    /// OpenSSL release archive.
    pub openssl: ArchiveSource,
    /// Git dependencies, in installation order.
    pub libraries: Vec<GitSource>,
    /// Library file names used by macOS relocation.
    pub dylibs: DylibNames,
    /// Tools found on the host.
    pub host: HostTools,
    /// Parallel `make` jobs.
    pub jobs: usize,
}

impl Config {
    /// Build the configuration from a manifest.
    ///
    /// Libraries install in the order libplist, libimobiledevice-glue,
    /// libusbmuxd; the latter two locate their prerequisites through
    /// pkg-config.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if a required dependency is missing or a
    /// git dependency has no pinned commit.
    pub fn new(
        root: impl AsRef<Path>,
        platform: Platform,
        manifest: &Manifest,
        host: HostTools,
    ) -> Result<Self, ManifestError> {
        let openssl = manifest.get(OPENSSL)?;
        let openssl = ArchiveSource {
            name: openssl.name.clone(),
            url: openssl.url.clone(),
            sha256: openssl.sha256.clone(),
        };

        let libraries = [
            (LIBPLIST, false),
            (LIBIMOBILEDEVICE_GLUE, true),
            (LIBUSBMUXD, true),
        ]
        .into_iter()
        .map(|(name, pkg_config)| {
            let (dep, commit) = manifest.pinned(name)?;
            Ok(GitSource {
                name: dep.name.clone(),
                url: dep.url.clone(),
                commit: commit.to_string(),
                pkg_config,
            })
        })
        .collect::<Result<Vec<_>, ManifestError>>()?;

        Ok(Self {
            layout: Layout::new(root.as_ref()),
            platform,
            openssl,
            libraries,
            dylibs: manifest.dylibs.clone(),
            host,
            jobs: num_cpus::get(),
        })
    }

    /// Override the number of parallel `make` jobs (minimum 1).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}
