//! Final libimobiledevice build against the populated prefix.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use imd_schema::OsFamily;

use crate::builder::{self, BuildContext};
use crate::config::Config;
use crate::error::InstallError;
use crate::installer::run_steps;
use crate::reporter::Reporter;
use crate::step::StepRunner;

/// Remove scratch space and fold `<prefix>/bin` into the prefix.
///
/// On MinGW the DLLs under `bin/` are copied into `lib/` first, since the
/// final build links and stages from there.
///
/// # Errors
///
/// Returns an error if a directory cannot be removed or a DLL cannot be
/// copied.
pub async fn finish_dependencies(config: &Config) -> Result<(), InstallError> {
    let layout = &config.layout;

    remove_dir_if_exists(&layout.tmp_dir()).await?;

    let bin = layout.bin_dir();
    if bin.is_dir() {
        if config.platform.os.is_mingw() {
            copy_matching(&bin, "*.dll", &layout.lib_dir()).await?;
        }
        remove_dir_if_exists(&bin).await?;
    }
    Ok(())
}

/// Fail unless OpenSSL is available from the host or the prefix.
///
/// # Errors
///
/// Returns [`InstallError::MissingPrerequisite`] when neither is present.
pub fn require_openssl(config: &Config) -> Result<(), InstallError> {
    if config.host.has_system_openssl() || config.layout.openssl_marker().exists() {
        Ok(())
    } else {
        Err(InstallError::MissingPrerequisite(
            "OpenSSL not found".to_string(),
        ))
    }
}

/// MinGW64: copy the toolchain's OpenSSL import libraries and DLLs into
/// `<prefix>/lib`.
///
/// # Errors
///
/// Returns an error if an import library is missing or a copy fails.
pub async fn stage_mingw_openssl(config: &Config) -> Result<(), InstallError> {
    let mingw = &config.host.mingw_root;
    let lib = config.layout.lib_dir();

    for import in ["libssl.dll.a", "libcrypto.dll.a"] {
        let from = mingw.join("lib").join(import);
        copy_file(&from, &lib.join(import)).await?;
    }
    let bin = mingw.join("bin");
    for pattern in ["libssl*.dll", "libcrypto*.dll"] {
        copy_matching(&bin, pattern, &lib).await?;
    }
    Ok(())
}

/// Build and install libimobiledevice into `<root>/build`.
///
/// # Errors
///
/// Returns an error if OpenSSL is missing, staging fails or any build step
/// fails.
pub async fn build_libimobiledevice<R, P>(
    config: &Config,
    runner: &R,
    reporter: &P,
) -> Result<(), InstallError>
where
    R: StepRunner + ?Sized,
    P: Reporter + ?Sized,
{
    let layout = &config.layout;
    require_openssl(config)?;

    if config.platform.os == OsFamily::MinGw64 {
        stage_mingw_openssl(config).await?;
    }

    let ctx = BuildContext::new(layout.root())
        .with_env(builder::native_env(layout, &config.host))
        .with_log(layout.build_log_path("libimobiledevice"));
    let steps = builder::native_build(&ctx, &layout.build_dir(), config.jobs);
    run_steps(runner, reporter, &steps).await?;

    if config.platform.os.is_mingw() {
        copy_matching(&layout.lib_dir(), "*.dll", &layout.build_dir().join("bin")).await?;
    }
    Ok(())
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), InstallError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallError::io("removing", dir)(e)),
    }
}

async fn copy_file(from: &Path, to: &Path) -> Result<(), InstallError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(InstallError::io("creating", parent))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(InstallError::io("copying", from))?;
    debug!(from = %from.display(), to = %to.display(), "copied");
    Ok(())
}

/// Copy files in `dir` matching `pattern` into `dest`. Returns the number
/// copied; an empty match is logged, not an error.
async fn copy_matching(dir: &Path, pattern: &str, dest: &Path) -> Result<usize, InstallError> {
    let full = format!(
        "{}/{pattern}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let matches: Vec<PathBuf> = glob::glob(&full)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();

    if matches.is_empty() {
        warn!(pattern = %full, "no files to copy");
    }
    for path in &matches {
        if let Some(name) = path.file_name() {
            copy_file(path, &dest.join(name)).await?;
        }
    }
    Ok(matches.len())
}
