//! Build step generation for autotools projects and OpenSSL.
//!
//! Nothing here runs a command. Each function returns the [`Step`]s for one
//! phase so the installer can hand them to a [`StepRunner`](crate::StepRunner)
//! in order and tests can inspect them directly.
//!
//! ## Environment contract
//!
//! Child steps inherit the operator's environment plus these overlays:
//!
//! | Variable | Value | When |
//! |---|---|---|
//! | `CPATH` | `<prefix>/include/openssl` | every git dependency |
//! | `PKG_CONFIG_PATH` | `<prefix>/lib/pkgconfig` (`:<mingw>/lib/pkgconfig` with a system OpenSSL) | pkg-config dependencies and the final build |
//! | `LD_LIBRARY_PATH` | `<prefix>/lib` | final build |

use std::path::{Path, PathBuf};

use imd_schema::{OpenSslTarget, OsFamily};

use crate::config::HostTools;
use crate::layout::Layout;
use crate::step::{EnvOverlay, Step};

/// Flags every MinGW `autogen.sh` invocation receives after `--prefix`.
const MINGW_AUTOGEN_FLAGS: [&str; 2] = ["--without-cython", "--enable-debug"];

/// `PKG_CONFIG_PATH` pointing at the prefix, plus the MinGW system
/// directory when the host provides OpenSSL.
pub fn pkg_config_env(layout: &Layout, host: &HostTools) -> EnvOverlay {
    let mut paths = vec![layout.pkg_config_dir()];
    if host.has_system_openssl() {
        paths.push(host.mingw_pkg_config_dir());
    }
    let mut env = EnvOverlay::new();
    env.set_search_path("PKG_CONFIG_PATH", &paths);
    env
}

/// Overlay for building one git dependency against the prefix.
pub fn library_env(layout: &Layout, host: &HostTools, pkg_config: bool) -> EnvOverlay {
    let mut env = if pkg_config {
        pkg_config_env(layout, host)
    } else {
        EnvOverlay::new()
    };
    env.set(
        "CPATH",
        layout.openssl_include_dir().to_string_lossy().into_owned(),
    );
    env
}

/// Overlay for the final libimobiledevice build.
pub fn native_env(layout: &Layout, host: &HostTools) -> EnvOverlay {
    pkg_config_env(layout, host).with(
        "LD_LIBRARY_PATH",
        layout.lib_dir().to_string_lossy().into_owned(),
    )
}

/// Steps shared by every build in one directory.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Working directory for each step.
    pub cwd: PathBuf,
    /// Environment overlay for each step.
    pub env: EnvOverlay,
    /// Log file receiving child output, if any.
    pub log: Option<PathBuf>,
}

impl BuildContext {
    /// Context rooted at `cwd` with an empty overlay and no log.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            env: EnvOverlay::new(),
            log: None,
        }
    }

    /// Replace the environment overlay.
    pub fn with_env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    /// Send child output to `log`.
    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// A step for `program` bound to this context.
    pub fn step(&self, program: &str) -> Step {
        Step::new(program)
            .current_dir(&self.cwd)
            .env(&self.env)
            .log_to(self.log.clone())
    }
}

fn prefix_arg(prefix: &Path) -> String {
    format!("--prefix={}", prefix.display())
}

/// `./autogen.sh CC=gcc CXX=g++ --prefix=<prefix> --without-cython --enable-debug`
fn gcc_autogen(ctx: &BuildContext, prefix: &Path) -> Step {
    ctx.step("./autogen.sh")
        .args(["CC=gcc", "CXX=g++"])
        .arg(prefix_arg(prefix))
        .args(MINGW_AUTOGEN_FLAGS)
}

/// Configure steps for an autotools checkout installing into `prefix`.
///
/// On Darwin the first `autogen.sh` pass may fail (it only bootstraps
/// `configure`), the second must succeed, then `configure` runs. MinGW passes
/// the compiler and prefix to `autogen.sh` directly, which configures too.
pub fn autotools_configure(os: OsFamily, ctx: &BuildContext, prefix: &Path) -> Vec<Step> {
    if os.is_mingw() {
        vec![gcc_autogen(ctx, prefix)]
    } else {
        vec![
            ctx.step("./autogen.sh").allow_failure(),
            ctx.step("./autogen.sh"),
            ctx.step("./configure")
                .arg(prefix_arg(prefix))
                .arg("--without-cython"),
        ]
    }
}

/// `make -j<jobs>` followed by `make <install_target>`.
pub fn make_install(ctx: &BuildContext, jobs: usize, install_target: &str) -> Vec<Step> {
    vec![
        ctx.step("make").arg(format!("-j{jobs}")),
        ctx.step("make").arg(install_target),
    ]
}

/// Full autotools build of a git dependency: configure, compile, install.
pub fn autotools_build(os: OsFamily, ctx: &BuildContext, prefix: &Path, jobs: usize) -> Vec<Step> {
    let mut steps = autotools_configure(os, ctx, prefix);
    steps.extend(make_install(ctx, jobs, "install"));
    steps
}

/// The final libimobiledevice build. Both OS families use the MinGW-style
/// `autogen.sh` invocation with the compiler pinned to gcc.
pub fn native_build(ctx: &BuildContext, prefix: &Path, jobs: usize) -> Vec<Step> {
    let mut steps = vec![gcc_autogen(ctx, prefix)];
    steps.extend(make_install(ctx, jobs, "install"));
    steps
}

/// OpenSSL build from an unpacked release: `./Configure`, compile, and
/// `install_sw` (libraries and headers only, no manual pages).
pub fn openssl_build(
    target: &OpenSslTarget,
    ctx: &BuildContext,
    prefix: &Path,
    jobs: usize,
) -> Vec<Step> {
    let mut steps = vec![ctx.step("./Configure").args(target.configure_args(prefix))];
    steps.extend(make_install(ctx, jobs, "install_sw"));
    steps
}

/// `git clone <url> <name>` in `tmp`, then `git checkout <commit>`.
pub fn git_checkout(ctx: &BuildContext, url: &str, name: &str, commit: &str) -> Vec<Step> {
    let clone_dir = ctx.cwd.join(name);
    vec![
        ctx.step("git").args(["clone", url, name]),
        Step::new("git")
            .args(["checkout", commit])
            .current_dir(clone_dir)
            .log_to(ctx.log.clone()),
    ]
}
