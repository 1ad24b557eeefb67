//! The complete bootstrap sequence.

use tracing::info;

use imd_schema::OsFamily;

use crate::config::Config;
use crate::error::InstallError;
use crate::installer::{InstallStatus, Installer};
use crate::native;
use crate::relinker::{self, RelocationPlan};
use crate::reporter::Reporter;
use crate::step::StepRunner;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Per-dependency outcome, in installation order.
    pub dependencies: Vec<(String, InstallStatus)>,
    /// Whether macOS load paths were rewritten.
    pub relocated: bool,
}

/// Install prerequisites, build libimobiledevice and, on macOS, relocate the
/// resulting dylibs.
///
/// Every step is awaited before the next starts. The first failure aborts
/// the run and leaves `tmp/` in place.
///
/// # Errors
///
/// Returns the first [`InstallError`] encountered.
pub async fn bootstrap<R, P>(
    config: &Config,
    runner: &R,
    reporter: &P,
) -> Result<BootstrapReport, InstallError>
where
    R: StepRunner + ?Sized,
    P: Reporter + ?Sized,
{
    info!(
        root = %config.layout.root().display(),
        platform = %config.platform.openssl.label,
        jobs = config.jobs,
        "bootstrap starting"
    );

    let installer = Installer::new(config, runner, reporter)?;
    installer.prepare().await?;
    let dependencies = installer.install_dependencies().await?;

    reporter.section("Build libimobiledevice");
    native::finish_dependencies(config).await?;
    native::build_libimobiledevice(config, runner, reporter).await?;

    let relocated = config.platform.os == OsFamily::Darwin;
    if relocated {
        reporter.section("Relocate dylibs");
        relinker::relocate(
            &RelocationPlan::default(),
            &config.layout,
            &config.dylibs,
            runner,
            reporter,
        )
        .await?;
    }

    Ok(BootstrapReport {
        dependencies,
        relocated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use imd_schema::{Manifest, Platform};

    use crate::NullReporter;
    use crate::config::HostTools;
    use crate::testutil::{MANIFEST, RecordingRunner};

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn complete_prefix(root: &Path, system: &str) -> Config {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let platform = Platform::resolve(system, "arm64").unwrap();
        let config = Config::new(root, platform, &manifest, HostTools::default()).unwrap();
        touch(&config.layout.openssl_marker());
        for lib in ["libplist-2.0.dylib", "libimobiledevice-glue-1.0.dylib", "libusbmuxd-2.0.dylib"] {
            touch(&config.layout.lib_dir().join(lib));
        }
        config
    }

    #[tokio::test]
    async fn test_bootstrap_darwin_relocates_after_build() {
        let tmp = tempfile::tempdir().unwrap();
        let config = complete_prefix(tmp.path(), "Darwin");
        let runner = RecordingRunner::new();

        let report = bootstrap(&config, &runner, &NullReporter).await.unwrap();
        assert!(report.relocated);
        assert_eq!(report.dependencies.len(), 4);
        assert!(!config.layout.tmp_dir().exists());

        let programs: Vec<String> = runner.steps().into_iter().map(|s| s.program).collect();
        let first_relocation = programs
            .iter()
            .position(|p| p == "install_name_tool")
            .unwrap();
        assert_eq!(&programs[..3], ["./autogen.sh", "make", "make"]);
        assert_eq!(first_relocation, 3);
        assert_eq!(
            programs.iter().filter(|p| *p == "install_name_tool").count(),
            6
        );
    }

    #[tokio::test]
    async fn test_bootstrap_mingw_skips_relocation() {
        let tmp = tempfile::tempdir().unwrap();
        let config = complete_prefix(tmp.path(), "MINGW32_NT-10.0");
        let runner = RecordingRunner::new();

        let report = bootstrap(&config, &runner, &NullReporter).await.unwrap();
        assert!(!report.relocated);
        assert!(runner.steps().iter().all(|s| s.program != "install_name_tool"));
    }

    #[tokio::test]
    async fn test_bootstrap_build_failure_skips_relocation() {
        let tmp = tempfile::tempdir().unwrap();
        let config = complete_prefix(tmp.path(), "Darwin");
        let runner = RecordingRunner::new().fail_on("make install");

        let err = bootstrap(&config, &runner, &NullReporter).await.unwrap_err();
        assert!(matches!(err, InstallError::Step(_)));
        assert!(runner.steps().iter().all(|s| s.program != "install_name_tool"));
    }

    #[derive(Default)]
    struct SuccessLog(std::sync::Mutex<Vec<String>>);

    impl Reporter for SuccessLog {
        fn section(&self, _: &str) {}
        fn step(&self, _: &str) {}
        fn skipped(&self, _: &str, _: &str) {}
        fn downloading(&self, _: &str, _: u64, _: Option<u64>) {}
        fn extracting(&self, _: &str) {}
        fn installed(&self, _: &str) {}
        fn info(&self, _: &str) {}
        fn success(&self, msg: &str) {
            self.0.lock().unwrap().push(msg.to_string());
        }
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
    }

    #[tokio::test]
    async fn test_bootstrap_leaves_final_success_to_caller() {
        let tmp = tempfile::tempdir().unwrap();
        let config = complete_prefix(tmp.path(), "Darwin");
        let reporter = SuccessLog::default();

        bootstrap(&config, &RecordingRunner::new(), &reporter)
            .await
            .unwrap();
        assert!(reporter.0.lock().unwrap().is_empty());
    }
}
