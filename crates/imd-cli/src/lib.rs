//! imd-bootstrap - libimobiledevice dependency installer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Builds OpenSSL, libplist, libimobiledevice-glue and libusbmuxd into a
//! local prefix, then builds libimobiledevice against it.
//!
//! # Directory Layout
//!
//! ```text
//! <root>/
//! ├── scripts/dependencies.json   # Pinned dependency manifest
//! ├── dependencies/               # Install prefix
//! ├── build/                      # libimobiledevice output
//! └── logs/                       # Build logs
//! ```

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Manifest location relative to the root when `--manifest` is not given.
pub const DEFAULT_MANIFEST: &str = "scripts/dependencies.json";

#[derive(Debug, Parser)]
#[command(name = "imd-bootstrap")]
#[command(author, version, about = "Build libimobiledevice and its native dependencies")]
pub struct Cli {
    /// Only print errors and the final result
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Platform overrides shared by every command that resolves the host.
#[derive(Debug, Clone, Args)]
pub struct PlatformArgs {
    /// Override the detected OS name (`Darwin`, `MINGW64_NT-10.0`, ...)
    #[arg(long = "os", value_name = "NAME")]
    pub os: Option<String>,

    /// Override the detected architecture (`arm64`, `x86_64`)
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<String>,

    /// Project root (the libimobiledevice checkout)
    #[arg(long, env = "IMD_ROOT", value_name = "DIR")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install all dependencies and build libimobiledevice
    Install {
        #[command(flatten)]
        platform: PlatformArgs,

        /// Dependency manifest (JSON or TOML)
        #[arg(long, env = "IMD_MANIFEST", value_name = "FILE")]
        manifest: Option<PathBuf>,

        /// Parallel make jobs (default: logical CPUs)
        #[arg(short, long, env = "IMD_JOBS")]
        jobs: Option<usize>,

        /// Stream build output instead of writing it to logs/
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show the detected platform and its OpenSSL configuration
    Platform {
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
