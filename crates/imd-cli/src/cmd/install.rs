//! Install command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use tracing::debug;

use imd_core::{
    Config, HostTools, InstallError, InstallStatus, Layout, ProcessRunner, Reporter, StepError,
    bootstrap,
};
use imd_schema::Manifest;

use super::{resolve_platform, resolve_root};
use crate::ui::ConsoleReporter;
use crate::{DEFAULT_MANIFEST, PlatformArgs};

/// Run the full bootstrap.
///
/// The platform, root and manifest are all resolved before anything is
/// written, so an unsupported host or a bad manifest leaves the tree
/// untouched.
pub async fn install(
    platform_args: &PlatformArgs,
    manifest: Option<&Path>,
    jobs: Option<usize>,
    verbose: bool,
    quiet: bool,
) -> Result<()> {
    let platform = resolve_platform(platform_args)?;
    let root = resolve_root(platform_args)?;

    let manifest_path = manifest.map_or_else(|| root.join(DEFAULT_MANIFEST), Path::to_path_buf);
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;

    let mut config = Config::new(&root, platform, &manifest, HostTools::detect())
        .context("Invalid dependency manifest")?;
    if let Some(jobs) = jobs {
        config = config.with_jobs(jobs);
    }
    debug!(
        root = %root.display(),
        manifest = %manifest_path.display(),
        jobs = config.jobs,
        "resolved install settings"
    );

    let reporter = ConsoleReporter::new(quiet);
    reporter.info(&format!(
        "{} {} ({} jobs)",
        "Building for".dark_grey(),
        config.platform.openssl.label.bold(),
        config.jobs
    ));

    let runner = ProcessRunner::new(verbose);
    match bootstrap(&config, &runner, &reporter).await {
        Ok(report) => {
            let built = report
                .dependencies
                .iter()
                .filter(|(_, status)| *status == InstallStatus::Installed)
                .count();
            reporter.info(&format!(
                "{built} of {} dependencies built",
                report.dependencies.len()
            ));
            reporter.success(&format!(
                "libimobiledevice installed to {}",
                config.layout.build_dir().display()
            ));
            Ok(())
        }
        Err(e) => {
            report_failure(&reporter, &e, &config.layout);
            Err(e.into())
        }
    }
}

/// Show the log tail of a failed step so the cause is visible without
/// opening the log. Nothing is cleaned up after a failure.
fn report_failure(reporter: &ConsoleReporter, err: &InstallError, layout: &Layout) {
    if let InstallError::Step(StepError::Failed {
        log: Some(log),
        tail,
        ..
    }) = err
    {
        if let Some(tail) = tail {
            for line in tail.lines() {
                eprintln!("  {}", line.dark_grey());
            }
        }
        reporter.warning(&format!("full output in {}", log.display()));
    }
    reporter.error(&format!(
        "install stopped, partial state kept under {}",
        layout.root().display()
    ));
}
