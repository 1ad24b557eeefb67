//! Core library for `imd-bootstrap`.
//!
//! Builds the native dependency stack of libimobiledevice (OpenSSL, libplist,
//! libimobiledevice-glue, libusbmuxd) into a local prefix, then builds the
//! library itself against that prefix.
//!
//! # Directory Layout
//!
//! ```text
//! <root>/
//! ├── dependencies/   # Install prefix (include/, lib/, bin/)
//! ├── tmp/            # Clones and archives, removed on success
//! ├── build/          # Final libimobiledevice install
//! └── logs/           # Per-dependency build logs
//! ```
//!
//! Every external command goes through the [`StepRunner`] seam, so the whole
//! flow can be exercised in tests without a toolchain.

pub mod builder;
pub mod config;
pub mod error;
pub mod flow;
pub mod installer;
pub mod io;
pub mod layout;
pub mod native;
pub mod relinker;
pub mod reporter;
pub mod step;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ArchiveSource, Config, GitSource, HostTools};
pub use error::{FetchError, InstallError};
pub use flow::{BootstrapReport, bootstrap};
pub use installer::{InstallStatus, Installer};
pub use layout::Layout;
pub use relinker::{RelocationError, RelocationPlan};
pub use reporter::{NullReporter, Reporter};
pub use step::{EnvOverlay, ProcessRunner, Step, StepError, StepOutcome, StepRunner};

/// User Agent string for archive downloads
pub const USER_AGENT: &str = concat!("imd-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Extract the filename from a URL.
///
/// # Example
///
/// ```
/// use imd_core::filename_from_url;
///
/// assert_eq!(filename_from_url("https://www.openssl.org/source/openssl-1.1.1k.tar.gz"), "openssl-1.1.1k.tar.gz");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    url.split(['?', '#'])
        .next()
        .unwrap_or("")
        .split('/')
        .next_back()
        .unwrap_or("")
}
