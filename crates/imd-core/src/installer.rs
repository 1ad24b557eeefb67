//! Prerequisite installation into the shared prefix.
//!
//! OpenSSL comes from a release archive; libplist, libimobiledevice-glue and
//! libusbmuxd are cloned at a pinned commit and built with autotools. Each is
//! skipped when its marker is already present, so a second run over a
//! complete prefix executes nothing.

use std::io;

use reqwest::Client;
use tracing::{debug, info};

use crate::builder::{self, BuildContext};
use crate::config::{Config, GitSource};
use crate::error::InstallError;
use crate::io::{download, extract};
use crate::reporter::Reporter;
use crate::step::{Step, StepRunner};

/// What happened to one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// Built and installed in this run.
    Installed,
    /// Marker already present; nothing ran.
    AlreadyInstalled,
    /// The host provides it (system OpenSSL).
    SystemProvided,
}

/// Drives prerequisite installation for one [`Config`].
pub struct Installer<'a, R: ?Sized, P: ?Sized> {
    config: &'a Config,
    runner: &'a R,
    reporter: &'a P,
    client: Client,
}

impl<'a, R, P> Installer<'a, R, P>
where
    R: StepRunner + ?Sized,
    P: Reporter + ?Sized,
{
    /// Create an installer.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &'a Config, runner: &'a R, reporter: &'a P) -> Result<Self, InstallError> {
        let client = download::http_client()
            .map_err(|e| InstallError::fetch(&config.openssl.name, e))?;
        Ok(Self {
            config,
            runner,
            reporter,
            client,
        })
    }

    /// Create the prefix, scratch and log directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub async fn prepare(&self) -> Result<(), InstallError> {
        let layout = &self.config.layout;
        for dir in [
            layout.lib_dir(),
            layout.include_dir(),
            layout.tmp_dir(),
            layout.log_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(InstallError::io("creating", &dir))?;
        }
        Ok(())
    }

    /// Install everything in order: OpenSSL, then each git dependency.
    ///
    /// Stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, step or filesystem error.
    pub async fn install_dependencies(&self) -> Result<Vec<(String, InstallStatus)>, InstallError> {
        let mut results = Vec::with_capacity(self.config.libraries.len() + 1);
        results.push((self.config.openssl.name.clone(), self.install_openssl().await?));
        for library in &self.config.libraries {
            results.push((library.name.clone(), self.install_library(library).await?));
        }
        Ok(results)
    }

    /// Install OpenSSL from its release archive unless it is already
    /// available.
    ///
    /// # Errors
    ///
    /// Returns an error if the download, extraction or build fails.
    pub async fn install_openssl(&self) -> Result<InstallStatus, InstallError> {
        let source = &self.config.openssl;
        let layout = &self.config.layout;

        if layout.openssl_marker().exists() {
            self.reporter.skipped(&source.name, "already installed");
            return Ok(InstallStatus::AlreadyInstalled);
        }
        if let Some(path) = &self.config.host.openssl {
            debug!(path = %path.display(), "using system openssl");
            self.reporter
                .skipped(&source.name, &format!("system {}", path.display()));
            return Ok(InstallStatus::SystemProvided);
        }

        self.reporter.section(&format!("Install {}", source.name));

        let file_name = crate::filename_from_url(&source.url);
        if extract::ArchiveFormat::detect(file_name).is_none() {
            return Err(InstallError::fetch(
                &source.name,
                extract::ExtractError::UnsupportedFormat(source.url.clone()),
            ));
        }

        let tmp = layout.tmp_dir();
        let archive = tmp.join(file_name);
        info!(url = %source.url, "downloading {}", source.name);
        download::download_file(
            &self.client,
            &source.name,
            &source.url,
            &archive,
            source.sha256.as_deref(),
            self.reporter,
        )
        .await
        .map_err(|e| InstallError::fetch(&source.name, e))?;

        self.reporter.extracting(&source.name);
        extract::extract_archive_async(archive.clone(), tmp.clone())
            .await
            .map_err(|e| InstallError::fetch(&source.name, e))?;

        let ctx = BuildContext::new(tmp.join(extract::archive_stem(file_name)))
            .with_log(layout.build_log_path(&source.name));
        let steps = builder::openssl_build(
            &self.config.platform.openssl,
            &ctx,
            &layout.install_dir(),
            self.config.jobs,
        );
        self.run_steps(&steps).await?;

        self.reporter.installed(&source.name);
        Ok(InstallStatus::Installed)
    }

    /// Clone, build and install one git dependency unless its marker exists.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails or the stray `ltmain.sh` cannot be
    /// removed.
    pub async fn install_library(&self, source: &GitSource) -> Result<InstallStatus, InstallError> {
        let layout = &self.config.layout;

        if layout.is_library_installed(&source.name) {
            self.reporter.skipped(&source.name, "already installed");
            return Ok(InstallStatus::AlreadyInstalled);
        }

        self.reporter.section(&format!("Install {}", source.name));
        let log = layout.build_log_path(&source.name);

        let clone_dir = layout.clone_dir(&source.name);
        if clone_dir.exists() {
            debug!(dir = %clone_dir.display(), "reusing existing clone");
        } else {
            let ctx = BuildContext::new(layout.tmp_dir()).with_log(&log);
            let steps = builder::git_checkout(&ctx, &source.url, &source.name, &source.commit);
            self.run_steps(&steps).await?;
        }

        let env = builder::library_env(layout, &self.config.host, source.pkg_config);
        let ctx = BuildContext::new(clone_dir).with_env(env).with_log(&log);
        let steps = builder::autotools_build(
            self.config.platform.os,
            &ctx,
            &layout.install_dir(),
            self.config.jobs,
        );
        self.run_steps(&steps).await?;

        let ltmain = layout.stray_ltmain();
        match tokio::fs::remove_file(&ltmain).await {
            Ok(()) => debug!(path = %ltmain.display(), "removed stray ltmain.sh"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(InstallError::io("removing", &ltmain)(e)),
        }

        self.reporter.installed(&source.name);
        Ok(InstallStatus::Installed)
    }

    async fn run_steps(&self, steps: &[Step]) -> Result<(), InstallError> {
        run_steps(self.runner, self.reporter, steps).await
    }
}

/// Report and run `steps` in order, stopping at the first failure.
pub(crate) async fn run_steps<R, P>(runner: &R, reporter: &P, steps: &[Step]) -> Result<(), InstallError>
where
    R: StepRunner + ?Sized,
    P: Reporter + ?Sized,
{
    for step in steps {
        reporter.step(&step.command_line());
        runner.run(step).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    use imd_schema::{Manifest, Platform};

    use crate::NullReporter;
    use crate::config::HostTools;
    use crate::step::StepError;
    use crate::testutil::{MANIFEST, RecordingRunner, write_tar_gz};

    fn config(root: &Path, host: HostTools) -> Config {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let platform = Platform::resolve("Darwin", "arm64").unwrap();
        Config::new(root, platform, &manifest, host)
            .unwrap()
            .with_jobs(4)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    /// A runner whose `make install` leaves the library marker behind and
    /// whose `git clone` creates the clone directory.
    fn building_runner() -> RecordingRunner {
        RecordingRunner::new()
            .on("git clone", |step| {
                let cwd = step.cwd.clone().unwrap();
                fs::create_dir_all(cwd.join(&step.args[2])).unwrap();
            })
            .on("make install", |step| {
                let cwd = step.cwd.clone().unwrap();
                let name = cwd.file_name().unwrap().to_string_lossy().into_owned();
                let lib = cwd.parent().unwrap().parent().unwrap().join("dependencies/lib");
                touch(&lib.join(format!("{name}-2.0.dylib")));
            })
    }

    #[tokio::test]
    async fn test_complete_prefix_runs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), HostTools::default());
        touch(&config.layout.openssl_marker());
        for lib in ["libplist-2.0.so", "libimobiledevice-glue-1.0.so", "libusbmuxd-2.0.so"] {
            touch(&config.layout.lib_dir().join(lib));
        }

        let runner = RecordingRunner::new();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();
        let results = installer.install_dependencies().await.unwrap();

        assert!(runner.steps().is_empty());
        assert!(
            results
                .iter()
                .all(|(_, status)| *status == InstallStatus::AlreadyInstalled)
        );
    }

    #[tokio::test]
    async fn test_install_libplist() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), HostTools::default());
        touch(&config.layout.stray_ltmain());

        let runner = building_runner();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();

        let libplist = &config.libraries[0];
        let status = installer.install_library(libplist).await.unwrap();
        assert_eq!(status, InstallStatus::Installed);

        let prefix = config.layout.install_dir();
        assert_eq!(
            runner.commands(),
            [
                "git clone https://github.com/libimobiledevice/libplist.git libplist".to_string(),
                "git checkout 2d8d7ef".to_string(),
                "./autogen.sh".to_string(),
                "./autogen.sh".to_string(),
                format!("./configure --prefix={} --without-cython", prefix.display()),
                "make -j4".to_string(),
                "make install".to_string(),
            ]
        );

        let steps = runner.steps();
        assert_eq!(
            steps[2].env.get("CPATH").map(PathBuf::from),
            Some(config.layout.openssl_include_dir())
        );
        assert_eq!(steps[2].env.get("PKG_CONFIG_PATH"), None);
        assert!(steps.iter().all(|s| s.log.is_some()));
        assert!(config.layout.is_library_installed("libplist"));
        assert!(!config.layout.stray_ltmain().exists());

        let again = installer.install_library(libplist).await.unwrap();
        assert_eq!(again, InstallStatus::AlreadyInstalled);
        assert_eq!(runner.steps().len(), 7);
    }

    #[tokio::test]
    async fn test_existing_clone_skips_git() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), HostTools::default());
        fs::create_dir_all(config.layout.clone_dir("libusbmuxd")).unwrap();

        let runner = building_runner();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();
        installer.install_library(&config.libraries[2]).await.unwrap();

        let steps = runner.steps();
        assert!(steps.iter().all(|s| s.program != "git"));
        assert_eq!(
            steps[0].env.get("PKG_CONFIG_PATH").map(PathBuf::from),
            Some(config.layout.pkg_config_dir())
        );
    }

    #[tokio::test]
    async fn test_system_openssl_skips_download() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let host = HostTools {
            openssl: Some(PathBuf::from("/usr/bin/openssl")),
            ..HostTools::default()
        };
        let mut config = config(tmp.path(), host);
        config.openssl.url = format!("{}/source/openssl-1.1.1k.tar.gz", server.url());

        let runner = RecordingRunner::new();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();

        let status = installer.install_openssl().await.unwrap();
        assert_eq!(status, InstallStatus::SystemProvided);
        assert!(runner.steps().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openssl_download_and_build() {
        let fixture = tempfile::tempdir().unwrap();
        let tarball = fixture.path().join("openssl-1.1.1k.tar.gz");
        write_tar_gz(
            &tarball,
            &[("openssl-1.1.1k/Configure", &b"#!/usr/bin/env perl\n"[..])],
        );
        let body = fs::read(&tarball).unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/source/openssl-1.1.1k.tar.gz")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), HostTools::default());
        config.openssl.url = format!("{}/source/openssl-1.1.1k.tar.gz", server.url());

        let runner = RecordingRunner::new();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();

        let status = installer.install_openssl().await.unwrap();
        assert_eq!(status, InstallStatus::Installed);
        mock.assert_async().await;

        let src = config.layout.tmp_dir().join("openssl-1.1.1k");
        assert!(src.join("Configure").is_file());

        let steps = runner.steps();
        assert_eq!(
            runner.commands(),
            [
                format!(
                    "./Configure --prefix={} darwin64-arm64-cc",
                    config.layout.install_dir().display()
                ),
                "make -j4".to_string(),
                "make install_sw".to_string(),
            ]
        );
        assert!(steps.iter().all(|s| s.cwd.as_deref() == Some(src.as_path())));
    }

    #[tokio::test]
    async fn test_openssl_hash_mismatch_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/openssl-1.1.1k.tar.gz")
            .with_status(200)
            .with_body("tampered")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), HostTools::default());
        config.openssl.url = format!("{}/openssl-1.1.1k.tar.gz", server.url());
        config.openssl.sha256 = Some("0".repeat(64));

        let runner = RecordingRunner::new();
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();

        let err = installer.install_openssl().await.unwrap_err();
        assert!(matches!(err, InstallError::Fetch { .. }));
        assert!(runner.steps().is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_later_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), HostTools::default());
        touch(&config.layout.openssl_marker());

        let runner = building_runner().fail_on("libimobiledevice-glue.git");
        let installer = Installer::new(&config, &runner, &NullReporter).unwrap();
        installer.prepare().await.unwrap();

        let err = installer.install_dependencies().await.unwrap_err();
        assert!(matches!(err, InstallError::Step(StepError::Failed { .. })));

        let commands = runner.commands();
        assert!(commands.last().unwrap().contains("libimobiledevice-glue.git"));
        assert!(!commands.iter().any(|c| c.contains("libusbmuxd")));
        assert!(config.layout.is_library_installed("libplist"));
    }
}
