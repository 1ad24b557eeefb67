//! Filesystem layout under the project root.

use std::path::{Path, PathBuf};

/// Name of the install prefix directory.
const INSTALL_DIR: &str = "dependencies";

/// Paths derived from a single project root.
///
/// The root is the libimobiledevice source tree the installer runs in; all
/// dependencies install into one shared prefix beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root: `<root>`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install prefix: `<root>/dependencies`
    pub fn install_dir(&self) -> PathBuf {
        self.root.join(INSTALL_DIR)
    }

    /// Library directory: `<root>/dependencies/lib`
    pub fn lib_dir(&self) -> PathBuf {
        self.install_dir().join("lib")
    }

    /// Header directory: `<root>/dependencies/include`
    pub fn include_dir(&self) -> PathBuf {
        self.install_dir().join("include")
    }

    /// Binary directory: `<root>/dependencies/bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.install_dir().join("bin")
    }

    /// pkg-config metadata: `<root>/dependencies/lib/pkgconfig`
    pub fn pkg_config_dir(&self) -> PathBuf {
        self.lib_dir().join("pkgconfig")
    }

    /// OpenSSL headers: `<root>/dependencies/include/openssl`
    pub fn openssl_include_dir(&self) -> PathBuf {
        self.include_dir().join("openssl")
    }

    /// Presence of this header means OpenSSL is installed in the prefix.
    pub fn openssl_marker(&self) -> PathBuf {
        self.openssl_include_dir().join("opensslv.h")
    }

    /// Scratch directory: `<root>/tmp`
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Clone directory of a git dependency: `<root>/tmp/<name>`
    pub fn clone_dir(&self, name: &str) -> PathBuf {
        self.tmp_dir().join(name)
    }

    /// Final build prefix: `<root>/build`
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Logs directory: `<root>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Generate a build log path for a dependency
    pub fn build_log_path(&self, name: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir().join(format!("build-{name}-{timestamp}.log"))
    }

    /// Libtool script left in the root by dependency bootstraps.
    pub fn stray_ltmain(&self) -> PathBuf {
        self.root.join("ltmain.sh")
    }

    /// Glob pattern matching an installed library: `<lib>/<name>-*`
    ///
    /// The directory part is escaped so roots containing `[` or `*` still
    /// match literally.
    pub fn library_marker_pattern(&self, name: &str) -> String {
        let lib_dir = glob::Pattern::escape(&self.lib_dir().to_string_lossy());
        let name = glob::Pattern::escape(name);
        format!("{lib_dir}/{name}-*")
    }

    /// Whether any file matches [`library_marker_pattern`](Self::library_marker_pattern).
    ///
    /// Presence only; the version and contents are not inspected.
    pub fn is_library_installed(&self, name: &str) -> bool {
        glob::glob(&self.library_marker_pattern(name))
            .map(|mut paths| paths.any(|p| p.is_ok()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = Layout::new("/work");
        assert_eq!(layout.install_dir(), PathBuf::from("/work/dependencies"));
        assert_eq!(layout.pkg_config_dir(), PathBuf::from("/work/dependencies/lib/pkgconfig"));
        assert_eq!(
            layout.openssl_marker(),
            PathBuf::from("/work/dependencies/include/openssl/opensslv.h")
        );
        assert_eq!(layout.clone_dir("libplist"), PathBuf::from("/work/tmp/libplist"));
        assert_eq!(layout.build_dir(), PathBuf::from("/work/build"));
    }

    #[test]
    fn test_build_log_path() {
        let layout = Layout::new("/work");
        let log = layout.build_log_path("libplist");
        assert!(log.starts_with("/work/logs"));
        let file = log.file_name().unwrap().to_string_lossy();
        assert!(file.starts_with("build-libplist-"));
        assert!(file.ends_with(".log"));
    }

    #[test]
    fn test_library_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        assert!(!layout.is_library_installed("libplist"));

        std::fs::create_dir_all(layout.lib_dir()).unwrap();
        // A different library sharing the prefix must not count
        std::fs::write(layout.lib_dir().join("libplist++-2.0.so"), "").unwrap();
        assert!(!layout.is_library_installed("libplist"));

        std::fs::write(layout.lib_dir().join("libplist-2.0.so"), "").unwrap();
        assert!(layout.is_library_installed("libplist"));
    }

    #[test]
    fn test_marker_pattern_escapes_root() {
        let layout = Layout::new("/work/[odd]");
        assert_eq!(
            layout.library_marker_pattern("libusbmuxd"),
            "/work/[[]odd[]]/dependencies/lib/libusbmuxd-*"
        );
    }
}
