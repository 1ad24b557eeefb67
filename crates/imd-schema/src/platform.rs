//! Host platform model and the OpenSSL build-target table.
//!
//! Platforms are described by two strings in `uname` style: the system name
//! (`Darwin`, `MINGW64_NT-10.0-19045`, ...) and the machine architecture
//! (`x86_64`, `arm64`, ...). [`lookup`] maps such a pair onto an OpenSSL
//! `Configure` target through a fixed table; everything not in the table is
//! [`BuildConfig::Unsupported`].
//!
//! # Example
//!
//! ```
//! use imd_schema::{lookup, BuildConfig};
//!
//! match lookup("Darwin", "arm64") {
//!     BuildConfig::Supported { target, .. } => assert_eq!(target.target, "darwin64-arm64-cc"),
//!     BuildConfig::Unsupported(_) => unreachable!(),
//! }
//! ```

use std::fmt;
use std::path::Path;

/// Operating-system families the installer knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// macOS.
    Darwin,
    /// MSYS2 MinGW 64-bit shell.
    MinGw64,
    /// MSYS2 MinGW 32-bit shell.
    MinGw32,
}

impl OsFamily {
    /// Classify a `uname -s` style system name.
    ///
    /// MinGW shells report names like `MINGW64_NT-10.0-19045`, so those are
    /// matched by substring; `Darwin` must match exactly.
    pub fn from_system_name(name: &str) -> Option<Self> {
        if name == "Darwin" {
            Some(Self::Darwin)
        } else if name.contains("MINGW64") {
            Some(Self::MinGw64)
        } else if name.contains("MINGW32") {
            Some(Self::MinGw32)
        } else {
            None
        }
    }

    /// Whether this is one of the Windows MinGW flavors.
    pub fn is_mingw(self) -> bool {
        matches!(self, Self::MinGw64 | Self::MinGw32)
    }

    /// Short display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Darwin => "Darwin",
            Self::MinGw64 => "MINGW64",
            Self::MinGw32 => "MINGW32",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architectures with a distinct OpenSSL target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// Apple Silicon / `aarch64`.
    Arm64,
    /// Intel / AMD 64-bit.
    X86_64,
}

impl Arch {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// An OpenSSL `Configure` target and the flags that go with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSslTarget {
    /// Target name passed as the last `Configure` argument.
    pub target: &'static str,
    /// Whether to pass `--openssldir=<prefix>/openssl`.
    pub with_openssl_dir: bool,
    /// Human readable label for progress output.
    pub label: &'static str,
}

impl OpenSslTarget {
    /// Arguments for `./Configure` with the given install prefix.
    pub fn configure_args(&self, prefix: &Path) -> Vec<String> {
        let mut args = vec![format!("--prefix={}", prefix.display())];
        if self.with_openssl_dir {
            args.push(format!(
                "--openssldir={}",
                prefix.join("openssl").display()
            ));
        }
        args.push(self.target.to_string());
        args
    }

    /// The full `./Configure` command line, as it would be typed in a shell.
    pub fn configure_command(&self, prefix: &Path) -> String {
        format!("./Configure {}", self.configure_args(prefix).join(" "))
    }
}

#[derive(Debug, Clone, Copy)]
enum ArchKey {
    Any,
    Exact(Arch),
}

const OPENSSL_TARGETS: [(OsFamily, ArchKey, OpenSslTarget); 4] = [
    (
        OsFamily::Darwin,
        ArchKey::Exact(Arch::X86_64),
        OpenSslTarget {
            target: "darwin64-x86_64-cc",
            with_openssl_dir: true,
            label: "Darwin Intel",
        },
    ),
    (
        OsFamily::Darwin,
        ArchKey::Exact(Arch::Arm64),
        OpenSslTarget {
            target: "darwin64-arm64-cc",
            with_openssl_dir: false,
            label: "Darwin Apple Silicon",
        },
    ),
    (
        OsFamily::MinGw64,
        ArchKey::Any,
        OpenSslTarget {
            target: "mingw64",
            with_openssl_dir: false,
            label: "Windows MINGW64",
        },
    ),
    (
        OsFamily::MinGw32,
        ArchKey::Any,
        OpenSslTarget {
            target: "mingw32",
            with_openssl_dir: false,
            label: "Windows MINGW32",
        },
    ),
];

/// Why a platform pair was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Known OS, but no target for this architecture.
    InvalidArchitecture,
    /// The OS itself has no toolchain mapping.
    NoSuitableCompiler,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArchitecture => f.write_str("invalid architecture found"),
            Self::NoSuitableCompiler => f.write_str("no suitable compiler has been found"),
        }
    }
}

/// A supported platform with its resolved build configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// OS family.
    pub os: OsFamily,
    /// Architecture, when it is one we recognise.
    pub arch: Option<Arch>,
    /// Raw system name the platform was resolved from.
    pub system_name: String,
    /// Raw machine name the platform was resolved from.
    pub machine: String,
    /// OpenSSL configure target.
    pub openssl: OpenSslTarget,
}

/// Result of a table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildConfig {
    /// The pair maps onto an OpenSSL target.
    Supported {
        /// OS family the system name was classified as.
        os: OsFamily,
        /// Matching table entry.
        target: OpenSslTarget,
    },
    /// The pair is not buildable.
    Unsupported(UnsupportedReason),
}

/// Look up the OpenSSL target for a system/machine pair.
pub fn lookup(system_name: &str, machine: &str) -> BuildConfig {
    let Some(os) = OsFamily::from_system_name(system_name) else {
        return BuildConfig::Unsupported(UnsupportedReason::NoSuitableCompiler);
    };
    let arch = machine.parse::<Arch>().ok();

    OPENSSL_TARGETS
        .iter()
        .find(|(family, key, _)| {
            *family == os
                && match key {
                    ArchKey::Any => true,
                    ArchKey::Exact(a) => arch == Some(*a),
                }
        })
        .map_or(
            BuildConfig::Unsupported(UnsupportedReason::InvalidArchitecture),
            |(_, _, target)| BuildConfig::Supported { os, target: *target },
        )
}

/// Errors produced when resolving the host platform.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The OS/architecture pair has no build configuration.
    #[error("unsupported platform {os}/{arch}: {reason}")]
    Unsupported {
        /// System name.
        os: String,
        /// Machine name.
        arch: String,
        /// Why it was rejected.
        reason: UnsupportedReason,
    },
}

impl Platform {
    /// Resolve a system/machine pair into a [`Platform`].
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Unsupported`] if the pair is not in the table.
    pub fn resolve(system_name: &str, machine: &str) -> Result<Self, PlatformError> {
        let (os, openssl) = match lookup(system_name, machine) {
            BuildConfig::Supported { os, target } => (os, target),
            BuildConfig::Unsupported(reason) => {
                return Err(PlatformError::Unsupported {
                    os: system_name.to_string(),
                    arch: machine.to_string(),
                    reason,
                });
            }
        };

        Ok(Self {
            os,
            arch: machine.parse().ok(),
            system_name: system_name.to_string(),
            machine: machine.to_string(),
            openssl,
        })
    }

    /// Resolve the platform this process runs on.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Unsupported`] on hosts outside the table.
    pub fn detect() -> Result<Self, PlatformError> {
        Self::resolve(&host_system_name(), &host_machine())
    }
}

/// The `uname -s` style name of the running host.
///
/// On Windows the MSYS2 `MSYSTEM` variable distinguishes the MinGW shells.
pub fn host_system_name() -> String {
    match std::env::consts::OS {
        "macos" => "Darwin".to_string(),
        "windows" => std::env::var("MSYSTEM")
            .map(|s| s.to_uppercase())
            .unwrap_or_else(|_| "Windows".to_string()),
        other => other.to_string(),
    }
}

/// The machine architecture of the running host.
pub fn host_machine() -> String {
    std::env::consts::ARCH.to_string()
}
