//! Subcommand implementations

pub mod completions;
pub mod install;
pub mod platform;

use anyhow::{Context, Result};
use std::path::PathBuf;

use imd_schema::{Platform, host_machine, host_system_name};

use crate::PlatformArgs;

/// Resolve the platform from overrides, falling back to the running host.
pub fn resolve_platform(args: &PlatformArgs) -> Result<Platform> {
    let platform = match (&args.os, &args.arch) {
        (None, None) => Platform::detect()?,
        (os, arch) => {
            let system = os.clone().unwrap_or_else(host_system_name);
            let machine = arch.clone().unwrap_or_else(host_machine);
            Platform::resolve(&system, &machine)?
        }
    };
    Ok(platform)
}

/// Absolute project root: `--root`/`IMD_ROOT` or the current directory.
pub fn resolve_root(args: &PlatformArgs) -> Result<PathBuf> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    std::path::absolute(&root)
        .with_context(|| format!("Invalid root directory {}", root.display()))
}
